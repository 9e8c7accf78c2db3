use crate::{
    errors::{ConnResult, FilterError},
    filters::filter::{Capabilities, Filter, Next},
    Conn,
};
use serde::Deserialize;
use std::time::Instant;
use tracing::{event, Level};

/// Level of the events emitted by [`RequestLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RequestLogConfig {
    level: LogLevel,
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Trace => event!(Level::TRACE, $($arg)+),
            LogLevel::Debug => event!(Level::DEBUG, $($arg)+),
            LogLevel::Info => event!(Level::INFO, $($arg)+),
            LogLevel::Warn => event!(Level::WARN, $($arg)+),
            LogLevel::Error => event!(Level::ERROR, $($arg)+),
        }
    };
}

/// Logs every request with its method, path, status and duration.
///
/// Registered as `request_log`, configured with `level = "debug"` and so on.
/// Failures are logged by [`App::handle`](crate::App::handle), not here.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLog {
    level: LogLevel,
}

impl RequestLog {
    #[inline]
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    #[inline(always)]
    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub(crate) fn from_config(config: Option<&toml::Value>) -> Result<Self, FilterError> {
        let Some(config) = config else {
            return Ok(Self::default());
        };

        let config: RequestLogConfig =
            config
                .clone()
                .try_into()
                .map_err(|err: toml::de::Error| FilterError::InvalidConfig {
                    name: String::from("request_log"),
                    reason: err.to_string(),
                })?;
        Ok(Self::new(config.level))
    }
}

impl Filter for RequestLog {
    fn capabilities(&self) -> Capabilities {
        Capabilities::SERVICE
    }

    fn service(&self, conn: Conn, next: &Next<'_>) -> ConnResult {
        let start = Instant::now();
        let method = conn.method().to_owned();
        let path = conn.path();

        let conn = next(conn)?;
        log_at!(
            self.level,
            method = %method,
            path = %path,
            status = conn.status(),
            elapsed = ?start.elapsed(),
            "request handled"
        );
        Ok(conn)
    }
}

#[cfg(test)]
mod request_log_tests {
    use super::*;
    use crate::test;

    #[test]
    fn config() {
        let cases = [
            (None, Ok(LogLevel::Info)),
            (Some("level = 'debug'"), Ok(LogLevel::Debug)),
            (Some(""), Ok(LogLevel::Info)),
            (Some("level = 'loud'"), Err(())),
            (Some("colour = true"), Err(())),
        ];

        for (src, expected) in cases {
            let value = src.map(|src| toml::from_str::<toml::Value>(src).unwrap());
            let level = RequestLog::from_config(value.as_ref())
                .map(|log| log.level())
                .map_err(|_| ());
            assert_eq!(level, expected, "{src:?}");
        }
    }

    #[test]
    fn passes_the_connection_through() {
        let next = |conn: Conn| conn.send(204_u16, "");
        let conn = RequestLog::new(LogLevel::Trace)
            .service(test::req("GET", "/ping", ""), &next)
            .unwrap();

        assert_eq!(conn.status(), Some(204));
    }
}
