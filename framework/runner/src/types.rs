/// Recommended error type for a scenario's `main` function and any shared behaviour code.
/// Compatible with [crate::definition::HookResult] so `?` propagates either way.
pub type GustResult<T> = anyhow::Result<T>;
