/*!
 * Monitoring
 * Tracing bootstrap and operation spans
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, span_operation, OperationSpan};
