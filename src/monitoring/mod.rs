/*!
 * Monitoring
 * Tracing setup and command spans
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, span_command, CommandSpan};
