/// Give the object a name.
pub trait Named {
    /// Get the name of this object.
    fn get_name(&self) -> &str;
}

/// Bind the current thread to the given cpu core, ignoring failures.
pub(crate) fn bind_current(cpu: usize) {
    let cores = num_cpus::get().max(1);
    _ = core_affinity::set_for_current(core_affinity::CoreId { id: cpu % cores });
}
