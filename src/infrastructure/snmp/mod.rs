//! SNMP trap ingress.
//!
//! A UDP listener decoding v1/v2c traps; the resolved variable bindings
//! become the event payload, logged and enqueued exactly like an HTTP
//! event with `method = snmp`.

pub mod ber;
pub mod mib;

use std::sync::Arc;

use chrono::Duration;
use serde_json::{Map, Value};
use tokio::net::UdpSocket;
use tracing::{error, info};

use crate::domain::models::config::CsvFieldRule;
use crate::domain::models::{IngressMethod, IngressTask, NewIngressLog};
use crate::domain::ports::{IngressLogRepository, RuleRepository, TaskKind, TaskQueue};
use crate::infrastructure::payload::{expand_csv_fields, key_translate};

use ber::{decode_trap, BerValue, TrapMessage};
use mib::MibCatalog;

const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

pub struct SnmpListener {
    pub ingress: Arc<dyn IngressLogRepository>,
    pub queue: Arc<dyn TaskQueue>,
    pub rules: Arc<dyn RuleRepository>,
    pub csv_fields: Arc<Vec<CsvFieldRule>>,
    pub catalog: MibCatalog,
    pub bind: String,
}

impl SnmpListener {
    pub async fn run(&self) -> anyhow::Result<()> {
        let socket = UdpSocket::bind(&self.bind).await?;
        info!(bind = %self.bind, "SNMP listener started");

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            let remote_ip = peer.ip().to_string();
            if let Err(e) = self.handle_datagram(&buf[..len], &remote_ip).await {
                error!(%remote_ip, reason = %e, "failed to process trap");
            }
        }
    }

    async fn handle_datagram(&self, datagram: &[u8], remote_ip: &str) -> anyhow::Result<()> {
        info!(%remote_ip, method = "snmp", "new event");

        let message = match decode_trap(datagram) {
            Ok(message) => message,
            Err(e) => {
                error!(%remote_ip, reason = %e, "dropping undecodable trap");
                return Ok(());
            }
        };

        let mut event_data = Value::Object(trap_to_map(&message, &self.catalog));
        expand_csv_fields(&mut event_data, &self.csv_fields);

        let log = self
            .ingress
            .create(&NewIngressLog {
                remote_ip: remote_ip.to_string(),
                method: IngressMethod::Snmp,
                task: IngressTask::Event,
                task_data: event_data,
            })
            .await?;
        self.rules.register_ip(remote_ip).await?;
        self.queue
            .enqueue(TaskKind::IngestEvent, log.id, Duration::zero())
            .await?;
        Ok(())
    }
}

/// Flatten a trap's variable bindings into a payload map keyed by resolved,
/// sanitized symbol names.
pub fn trap_to_map(message: &TrapMessage, catalog: &MibCatalog) -> Map<String, Value> {
    let mut map = Map::new();
    for (oid, value) in &message.var_binds {
        let key = key_translate(&catalog.resolve(oid));
        map.insert(key, render_value(value, catalog));
    }
    map
}

fn render_value(value: &BerValue, catalog: &MibCatalog) -> Value {
    match value {
        BerValue::Integer(v) => Value::from(*v),
        BerValue::OctetString(bytes) | BerValue::Opaque(bytes) => {
            Value::from(String::from_utf8_lossy(bytes).into_owned())
        }
        BerValue::Null => Value::Null,
        BerValue::Oid(oid) => Value::from(catalog.resolve(oid)),
        BerValue::IpAddress(octets) => {
            Value::from(format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]))
        }
        BerValue::Counter32(v) | BerValue::Gauge32(v) | BerValue::TimeTicks(v) => Value::from(*v),
        BerValue::Counter64(v) => Value::from(*v),
    }
}
