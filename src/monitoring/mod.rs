/*!
 * Monitoring
 * Structured tracing for the bridge
 */

mod tracer;

pub use tracer::{init_tracing, HypercallSpan};
