//! Packet listener contract.

use super::classify::PacketRecord;

/// Receives every classified packet while attached to an engine.
///
/// Called on the capture thread, so implementations should return quickly.
/// A listener may call [`PacketCaptureEngine::stop`]: capture ends after the
/// current packet. It must not call `start`.
///
/// [`PacketCaptureEngine::stop`]: super::PacketCaptureEngine::stop
pub trait PacketListener: Send + Sync + 'static {
    fn on_packet(&self, record: PacketRecord);
}

impl<F> PacketListener for F
where
    F: Fn(PacketRecord) + Send + Sync + 'static,
{
    fn on_packet(&self, record: PacketRecord) {
        self(record);
    }
}

/// Listener that writes each record to the log.
///
/// Blocked packets are logged at `warn`, everything else at `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl PacketListener for LoggingListener {
    fn on_packet(&self, record: PacketRecord) {
        if record.is_blocked {
            tracing::warn!(
                seq = record.sequence,
                src = %record.source_ip,
                dst = %record.dest_ip,
                protocol = %record.protocol,
                length = record.length,
                "blocked destination: {}",
                record.info
            );
        } else {
            tracing::debug!(
                seq = record.sequence,
                src = %record.source_ip,
                dst = %record.dest_ip,
                protocol = %record.protocol,
                length = record.length,
                "{}",
                record.info
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::classify::Protocol;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn record(sequence: u64) -> PacketRecord {
        PacketRecord {
            sequence,
            timestamp: "00:00:00.000".to_string(),
            source_ip: "10.0.0.1".to_string(),
            dest_ip: "10.0.0.2".to_string(),
            protocol: Protocol::Udp,
            length: 42,
            info: "SrcPort: 1 -> DstPort: 2".to_string(),
            is_blocked: false,
        }
    }

    #[test]
    fn should_invoke_closure_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener = {
            let seen = Arc::clone(&seen);
            move |record: PacketRecord| seen.lock().push(record.sequence)
        };

        listener.on_packet(record(1));
        listener.on_packet(record(2));

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn should_accept_blocked_and_clean_records_in_logging_listener() {
        let mut blocked = record(3);
        blocked.is_blocked = true;

        LoggingListener.on_packet(record(1));
        LoggingListener.on_packet(blocked);
    }
}
