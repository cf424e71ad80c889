//! Scripted device clients for tests
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::device::{DeviceClient, DeviceConnector};
use crate::error::{AgentError, Result};
use crate::transform::RawRecord;

/// What a scripted command does
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<RawRecord>),
    Fail(String),
    Hang,
}

/// Behaviour of one scripted device
///
/// Replies are keyed by command, or by `command interface=<name>` for
/// per-interface commands. Unscripted commands return no rows.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub connect_fails: bool,
    pub connect_hangs: bool,
    pub replies: HashMap<String, Reply>,
}

impl Script {
    pub fn reply(mut self, command: &str, reply: Reply) -> Self {
        self.replies.insert(command.to_string(), reply);
        self
    }

    pub fn rows(self, command: &str, rows: Vec<serde_json::Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.reply(command, Reply::Rows(rows))
    }
}

/// Calls observed across all scripted clients
#[derive(Debug, Default)]
pub struct CallLog {
    pub executed: Mutex<Vec<(String, String)>>,
    pub closed: Mutex<Vec<String>>,
}

impl CallLog {
    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn close_count(&self, host: &str) -> usize {
        self.closed.lock().unwrap().iter().filter(|h| *h == host).count()
    }
}

/// Connector handing out scripted clients; unknown hosts refuse connections
#[derive(Default)]
pub struct ScriptedConnector {
    scripts: HashMap<String, Script>,
    pub log: Arc<CallLog>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, host: &str, script: Script) -> Self {
        self.scripts.insert(host.to_string(), script);
        self
    }
}

impl DeviceConnector for ScriptedConnector {
    fn client(&self, host: &str) -> Box<dyn DeviceClient> {
        let script = self.scripts.get(host).cloned().unwrap_or(Script {
            connect_fails: true,
            ..Default::default()
        });
        Box::new(ScriptedClient {
            host: host.to_string(),
            script,
            log: Arc::clone(&self.log),
        })
    }
}

struct ScriptedClient {
    host: String,
    script: Script,
    log: Arc<CallLog>,
}

#[async_trait]
impl DeviceClient for ScriptedClient {
    async fn connect(&mut self) -> Result<()> {
        if self.script.connect_hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.script.connect_fails {
            return Err(AgentError::connect(&self.host, "connection refused"));
        }
        Ok(())
    }

    async fn execute(&mut self, command: &str, args: &[(&str, &str)]) -> Result<Vec<RawRecord>> {
        let keyed = args
            .iter()
            .find(|(k, _)| *k == "interface")
            .map(|(_, v)| format!("{} interface={}", command, v));
        let key = keyed.unwrap_or_else(|| command.to_string());

        self.log
            .executed
            .lock()
            .unwrap()
            .push((self.host.clone(), key.clone()));

        match self.script.replies.get(&key).cloned() {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Fail(reason)) => Err(AgentError::command(command, reason)),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.log.closed.lock().unwrap().push(self.host.clone());
        Ok(())
    }
}
