//! `wait.port`: wait until a TCP port accepts connections

use super::Environment;
use super::wait::{export_retrier, retrier, retry_level, retry_message, with_retry_fields};
use declarative::{
    Context, ExportError, Exported, Failure, FieldMap, Level, Monitor, Outcome, Retrier, Status,
    Task, cancelled,
};
use prepare::{Field, Preparer, Schema};
use render::Render;
use std::fmt;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// Connect timeout used by [`TcpConnectionCheck::default`]
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A single reachability probe
pub trait ConnectionCheck: Send + Sync + fmt::Debug {
    fn check_connection(&self, host: &str, port: u16) -> io::Result<()>;
}

/// Dials every resolved address until one accepts
#[derive(Debug, Clone, Copy)]
pub struct TcpConnectionCheck {
    pub timeout: Duration,
}

impl Default for TcpConnectionCheck {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ConnectionCheck for TcpConnectionCheck {
    fn check_connection(&self, host: &str, port: u16) -> io::Result<()> {
        let mut last = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => return Ok(()),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{host} did not resolve"))
        }))
    }
}

pub fn schema() -> Schema {
    with_retry_fields(
        Schema::new()
            .field(Field::new("host"))
            .field(Field::new("port").required()),
    )
}

pub fn prepare(p: &mut Preparer<'_>, env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    Ok(Box::new(Port {
        host: p.get_or("host", "localhost".to_string())?,
        port: p.require("port")?,
        retrier: retrier(p)?,
        connector: Arc::clone(&env.connector),
    }))
}

#[derive(Debug)]
pub struct Port {
    host: String,
    port: u16,
    retrier: Retrier,
    connector: Arc<dyn ConnectionCheck>,
}

impl Port {
    fn connect(&self, ctx: &Context) -> Result<io::Result<()>, Failure> {
        let connector = Arc::clone(&self.connector);
        let host = self.host.clone();
        let port = self.port;
        ctx.run(move || connector.check_connection(&host, port))
            .map_err(|e| cancelled(e, Status::new()))
    }

    fn failed(&self, err: &io::Error) -> String {
        format!("Failed to connect to {}:{}: {err}", self.host, self.port)
    }
}

impl Exported for Port {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("host", self.host.clone())?;
        fields.insert("port", self.port)?;
        export_retrier(&self.retrier, fields)
    }
}

impl Monitor for Port {
    fn check(&mut self, ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        let mut status = Status::new();
        match self.connect(ctx)? {
            Ok(()) => {
                if self.retrier.retry_count > 0 {
                    status.add_message(retry_message(true, &self.retrier));
                }
            }
            Err(e) => {
                status.add_message(self.failed(&e));
                status.raise_level(Level::WillChange);
            }
        }
        Ok(status)
    }
}

impl Task for Port {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let connector = Arc::clone(&self.connector);
        let (host, port) = (self.host.clone(), self.port);
        let outcome = self
            .retrier
            .retry_until(ctx, || {
                let connector = Arc::clone(&connector);
                let host = host.clone();
                match ctx.run(move || connector.check_connection(&host, port)) {
                    Ok(Ok(())) => Ok(true),
                    Ok(Err(e)) => Err(e),
                    Err(interrupt) => Err(io::Error::new(io::ErrorKind::Interrupted, interrupt)),
                }
            })
            .map_err(|e| cancelled(e, Status::new()))?;

        let mut status = Status::new();
        match outcome {
            Ok(_) => {
                status.add_message(retry_message(true, &self.retrier));
                status.raise_level(retry_level(&self.retrier));
                Ok(status)
            }
            Err(e) => {
                ctx.check().map_err(|i| cancelled(i, status.clone()))?;
                status.add_message(retry_message(false, &self.retrier));
                let message = self.failed(&e);
                Err(Failure::fatal(status, anyhow::anyhow!(message)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::prepare_json;
    use render::ModuleRenderer;
    use serde_json::json;
    use std::net::TcpListener;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Instant;

    /// Refuses until `opens_at`
    #[derive(Debug)]
    struct Scripted {
        opens_at: Instant,
        dials: Mutex<u32>,
    }

    impl ConnectionCheck for Scripted {
        fn check_connection(&self, _host: &str, _port: u16) -> io::Result<()> {
            *self.dials.lock().unwrap() += 1;
            if Instant::now() >= self.opens_at {
                Ok(())
            } else {
                Err(io::Error::from(io::ErrorKind::ConnectionRefused))
            }
        }
    }

    fn env(connector: Arc<dyn ConnectionCheck>) -> Environment {
        Environment {
            connector,
            ..Environment::default()
        }
    }

    #[test]
    fn test_succeeds_after_retry() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
            for stream in listener.incoming().take(4) {
                drop(stream);
            }
        });

        let mut task = prepare_json(
            &schema(),
            prepare,
            &Environment::default(),
            json!({ "host": "127.0.0.1", "port": port, "interval": "50ms", "max_retry": 10 }),
        )
        .unwrap();
        let ctx = Context::new();
        task.apply(&ctx).unwrap();

        let fields = FieldMap::of(task.as_ref()).unwrap();
        let retries = fields.get("retry_count").unwrap().as_u64().unwrap();
        assert!((1..10).contains(&retries), "retry_count {retries}");
        assert!(!task.check(&ctx, &mut ModuleRenderer::new()).unwrap().has_changes());
    }

    #[test]
    fn test_check_reports_refusal() {
        let connector = Arc::new(Scripted {
            opens_at: Instant::now() + Duration::from_secs(3600),
            dials: Mutex::new(0),
        });
        let mut task = prepare_json(
            &schema(),
            prepare,
            &env(connector.clone()),
            json!({ "port": "8080" }),
        )
        .unwrap();

        let status = task.check(&Context::new(), &mut ModuleRenderer::new()).unwrap();
        assert_eq!(status.status_code(), Level::WillChange);
        assert!(status.messages()[0].starts_with("Failed to connect to localhost:8080: "));
        assert_eq!(*connector.dials.lock().unwrap(), 1);
    }

    #[test]
    fn test_gives_up_after_max_retry() {
        let connector = Arc::new(Scripted {
            opens_at: Instant::now() + Duration::from_secs(3600),
            dials: Mutex::new(0),
        });
        let failure = prepare_json(
            &schema(),
            prepare,
            &env(connector.clone()),
            json!({ "port": 9, "interval": "1ms", "max_retry": 3 }),
        )
        .unwrap()
        .apply(&Context::new())
        .unwrap_err();
        assert_eq!(failure.level(), Level::Fatal);
        assert!(failure.status.messages()[0].starts_with("Failed after 3 retries"));
        assert_eq!(*connector.dials.lock().unwrap(), 3);
    }

    #[test]
    fn test_open_port_applies_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut task = prepare_json(
            &schema(),
            prepare,
            &Environment::default(),
            json!({ "host": "127.0.0.1", "port": port }),
        )
        .unwrap();
        let ctx = Context::new();

        let check = task.check(&ctx, &mut ModuleRenderer::new()).unwrap();
        assert_eq!(check.status_code(), Level::NoChange);
        let status = task.apply(&ctx).unwrap();
        assert!(!status.has_changes());
        drop(listener);
    }

    #[test]
    fn test_bogus_interval_uses_default() {
        let task = prepare_json(
            &schema(),
            prepare,
            &Environment::default(),
            json!({ "port": 9, "interval": "bogus" }),
        )
        .unwrap();
        let fields = FieldMap::of(task.as_ref()).unwrap();
        assert_eq!(fields.get("interval"), Some(&json!("5s")));
        assert_eq!(fields.get("max_retry"), Some(&json!(5)));
    }

    #[test]
    fn test_port_out_of_range() {
        let err = prepare_json(&schema(), prepare, &Environment::default(), json!({ "port": 70000 }))
            .unwrap_err();
        assert!(err.to_string().contains("port"));
    }
}
