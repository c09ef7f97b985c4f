//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable backend (storage, verifier, account) exposes a `Registry`
/// type implementing this trait, pairing the name used under
/// `implementations.<name>` in the configuration with its factory.
pub trait ImplementationRegistry {
	/// Configuration name, e.g. `"memory"` or `"ecdsa"`.
	const NAME: &'static str;

	/// Factory function type of the owning module.
	type Factory;

	/// Returns the factory that builds this implementation from its config table.
	fn factory() -> Self::Factory;
}
