use crate::{
    errors::{ConnResult, FilterError},
    filters::filter::{Capabilities, Filter},
    Conn,
};
use std::sync::Arc;
use tracing::debug;

/// A compiled filter chain: one call runs every filter and the endpoint.
pub(crate) type Chain = Arc<dyn Fn(Conn) -> ConnResult + Send + Sync>;

/// Folds `filters` around `endpoint`, innermost last.
///
/// Filters are wrapped starting from the end of the list, so at run time
/// prepare and service steps run in declaration order and finalize steps in
/// reverse declaration order.
pub(crate) fn compile(
    filters: Vec<(String, Arc<dyn Filter>)>,
    endpoint: Chain,
) -> Result<Chain, FilterError> {
    filters
        .into_iter()
        .rev()
        .try_fold(endpoint, |next, (name, filter)| {
            let capabilities = filter.capabilities();
            debug!(filter = %name, ?capabilities, "compiling filter");

            let chain: Chain = if capabilities.contains(Capabilities::SERVICE) {
                Arc::new(move |conn| filter.service(conn, &*next))
            } else if capabilities.contains(Capabilities::PREPARE) {
                Arc::new(move |conn| next(filter.prepare(conn)?))
            } else if capabilities.contains(Capabilities::FINALIZE) {
                Arc::new(move |conn| filter.finalize(next(conn)?))
            } else {
                return Err(FilterError::NoCapabilities(name));
            };
            Ok(chain)
        })
}
