//! Navigation and network interception for calls made by the embedded runtime.
//!
//! The runtime believes it runs on the host origin. [`InterceptorRegistry`] is
//! built once per page and owns the only fetch primitive; every outbound call is
//! matched against an [`InterceptedCallTable`] before it leaves.

pub mod registry;
pub mod table;

pub use registry::Installation;
pub use registry::InterceptorRegistry;
pub use registry::NavigationOutcome;
pub use table::CallPattern;
pub use table::InterceptAction;
pub use table::InterceptRule;
pub use table::InterceptedCallTable;
