//! Registry trait for pluggable backends.

/// Implemented by every storage and courier backend module so that it can be
/// looked up by the name used under `implementations` in the config file.
pub trait ImplementationRegistry {
	/// Table name in the configuration, e.g. `memory` or `biteship`.
	const NAME: &'static str;

	/// Factory signature of the component family.
	type Factory;

	fn factory() -> Self::Factory;
}
