use core_affinity::{CoreId, get_core_ids, set_for_current};

/// Whether the OS reports a core with this id.
pub fn core_available(core_id: usize) -> bool {
    get_core_ids().is_some_and(|ids| ids.iter().any(|c| c.id == core_id))
}

/// Pin the calling thread to `core_id`.
pub fn try_pin_core(core_id: usize) -> anyhow::Result<usize> {
    if core_available(core_id) && set_for_current(CoreId { id: core_id }) {
        return Ok(core_id);
    }
    Err(anyhow::anyhow!("failed to pin core {core_id}"))
}
