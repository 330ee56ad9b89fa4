//! Timer controller bound to one device's datapoint store.
//! Exposes field accessors and setters that read, re-encode and dispatch the timer record.

use crate::datapoint::{DpId, DpValue, TIMER_DP_ID};
use crate::error::{Result, TimerError};
use crate::store::{DatapointStore, TaskSubmitter, TokioSubmitter};
use crate::timer::{self, TimerEdit, TimerField, TimerRecord, Validation, Weekday};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Host-facing settings for a timer controller.
///
/// ```rust
/// use tuya_ble_timer::controller::TimerConfig;
///
/// let config: TimerConfig = serde_json::from_str(r#"{"serialize_writes": true}"#).unwrap();
/// assert_eq!(config.dp_id, 17);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Datapoint carrying the raw timer record
    pub dp_id: DpId,
    /// Input checking applied before encoding
    pub validation: Validation,
    /// Route all timer writes through one ordered queue
    pub serialize_writes: bool,
    /// Pending edits the queue accepts before setters fail with `QueueFull`
    pub queue_capacity: usize,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            dp_id: TIMER_DP_ID,
            validation: Validation::Strict,
            serialize_writes: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Builder for [`Timer`].
pub struct TimerBuilder {
    device_id: String,
    store: Arc<dyn DatapointStore>,
    submitter: Option<Arc<dyn TaskSubmitter>>,
    config: TimerConfig,
}

impl TimerBuilder {
    pub fn new<I: Into<String>>(device_id: I, store: Arc<dyn DatapointStore>) -> Self {
        Self {
            device_id: device_id.into(),
            store,
            submitter: None,
            config: TimerConfig::default(),
        }
    }

    pub fn config(mut self, config: TimerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dp_id(mut self, dp_id: DpId) -> Self {
        self.config.dp_id = dp_id;
        self
    }

    pub fn validation(mut self, validation: Validation) -> Self {
        self.config.validation = validation;
        self
    }

    pub fn serialize_writes(mut self, serialize: bool) -> Self {
        self.config.serialize_writes = serialize;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity.max(1);
        self
    }

    /// Task facility used for background writes. Defaults to the current tokio runtime.
    pub fn submitter(mut self, submitter: Arc<dyn TaskSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn build(self) -> Result<Timer> {
        let submitter: Arc<dyn TaskSubmitter> = match self.submitter {
            Some(s) => s,
            None => Arc::new(TokioSubmitter::current().ok_or(TimerError::NoRuntime)?),
        };
        let device_id: Arc<str> = Arc::from(self.device_id);
        let cancel_token = CancellationToken::new();

        let queue = if self.config.serialize_writes {
            let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
            let worker = WriteQueue {
                device_id: device_id.clone(),
                dp_id: self.config.dp_id,
                validation: self.config.validation,
                store: self.store.clone(),
            };
            let token = cancel_token.clone();
            submitter.submit(Box::pin(worker.run(rx, token)));
            Some(tx)
        } else {
            None
        };

        info!(
            "Timer for device {} bound to dp {} (serialized: {})",
            device_id,
            self.config.dp_id,
            queue.is_some()
        );

        Ok(Timer {
            device_id,
            dp_id: self.config.dp_id,
            validation: self.config.validation,
            store: self.store,
            submitter,
            queue,
            cancel_token,
        })
    }
}

/// Commands handled by the serialized writer.
#[derive(Debug)]
enum TimerCommand {
    Edit(TimerEdit),
    Replace(Vec<u8>),
}

/// Weekly timer of one device.
///
/// Without write serialization every setter reads the cached value, so two edits issued
/// before the first write lands can overwrite each other.
#[derive(Clone)]
pub struct Timer {
    device_id: Arc<str>,
    dp_id: DpId,
    validation: Validation,
    store: Arc<dyn DatapointStore>,
    submitter: Arc<dyn TaskSubmitter>,
    queue: Option<mpsc::Sender<TimerCommand>>,
    cancel_token: CancellationToken,
}

impl Timer {
    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn dp_id(&self) -> DpId {
        self.dp_id
    }

    /// Decoded record, or `None` while the device has not reported a timer.
    pub fn record(&self) -> Option<TimerRecord> {
        timer::decode_value(self.store.read(self.dp_id).as_ref())
    }

    pub fn field(&self, field: TimerField) -> Option<u16> {
        self.record().map(|r| field.get(&r))
    }

    pub fn hour(&self) -> Option<u16> {
        self.field(TimerField::Hour)
    }

    pub fn minute(&self) -> Option<u16> {
        self.field(TimerField::Minute)
    }

    pub fn duration(&self) -> Option<u16> {
        self.field(TimerField::Duration)
    }

    pub fn day(&self, day: Weekday) -> Option<bool> {
        self.record().map(|r| r.active_days.contains(day))
    }

    pub fn enabled(&self) -> Option<bool> {
        self.record().map(|r| r.enabled)
    }

    /// Raw datapoint as base64, or an empty string when it is not a raw value.
    pub fn raw_base64(&self) -> String {
        match self.store.read(self.dp_id) {
            Some(DpValue::Raw(bytes)) => BASE64.encode(bytes),
            _ => String::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Setters
    // -------------------------------------------------------------------------

    /// Replaces one scalar field.
    ///
    /// Returns `Ok(false)` without writing when no timer value is known yet.
    pub fn set_field(&self, field: TimerField, value: u32) -> Result<bool> {
        self.edit(TimerEdit::Field(field, value))
    }

    pub fn set_hour(&self, hour: u32) -> Result<bool> {
        self.set_field(TimerField::Hour, hour)
    }

    pub fn set_minute(&self, minute: u32) -> Result<bool> {
        self.set_field(TimerField::Minute, minute)
    }

    pub fn set_duration(&self, minutes: u32) -> Result<bool> {
        self.set_field(TimerField::Duration, minutes)
    }

    /// Adds or removes one day from the schedule.
    pub fn set_day(&self, day: Weekday, active: bool) -> Result<bool> {
        self.edit(TimerEdit::Day(day, active))
    }

    /// Like [`set_day`](Self::set_day) but takes a day token such as `"Monday"`.
    ///
    /// Under [`Validation::Lenient`] an unknown token is ignored and nothing is written.
    pub fn set_day_token(&self, token: &str, active: bool) -> Result<bool> {
        match (Weekday::from_token(token), self.validation) {
            (Ok(day), _) => self.set_day(day, active),
            (Err(e), Validation::Strict) => Err(e),
            (Err(_), Validation::Lenient) => {
                warn!("Ignoring unknown day token '{}' for device {}", token, self.device_id);
                Ok(false)
            }
        }
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<bool> {
        self.edit(TimerEdit::Enabled(enabled))
    }

    /// Writes base64 text verbatim to the timer datapoint.
    ///
    /// The bytes are not checked against the record layout.
    pub fn set_raw_base64(&self, text: &str) -> Result<()> {
        let bytes = BASE64.decode(text.trim())?;
        match &self.queue {
            Some(queue) => enqueue(queue, TimerCommand::Replace(bytes)),
            None => {
                self.dispatch(bytes);
                Ok(())
            }
        }
    }

    /// Applies one edit with the read-modify-write sequence and submits the write.
    pub fn edit(&self, edit: TimerEdit) -> Result<bool> {
        let current = self.store.read(self.dp_id);
        let Some(raw) = current.as_ref().and_then(DpValue::as_raw) else {
            debug!(
                "Timer value for device {} unknown, skipping {:?}",
                self.device_id, edit
            );
            return Ok(false);
        };
        let Some(updated) = timer::apply_edit(raw, edit, self.validation)? else {
            debug!(
                "Timer value for device {} not decodable ({} bytes), skipping {:?}",
                self.device_id,
                raw.len(),
                edit
            );
            return Ok(false);
        };

        match &self.queue {
            Some(queue) => enqueue(queue, TimerCommand::Edit(edit))?,
            None => self.dispatch(updated.to_vec()),
        }
        Ok(true)
    }

    /// Stops the serialized writer, if any. Queued edits that have not started are dropped.
    pub fn stop(&self) {
        info!("Stopping timer writer for device {}", self.device_id);
        self.cancel_token.cancel();
    }

    fn dispatch(&self, bytes: Vec<u8>) {
        debug!(
            "Dispatching timer for device {}: {}",
            self.device_id,
            hex::encode(&bytes)
        );
        let write = self.store.write(self.dp_id, DpValue::Raw(bytes));
        let device_id = self.device_id.clone();
        let dp_id = self.dp_id;
        self.submitter.submit(Box::pin(async move {
            if let Err(e) = write.await {
                error!(
                    "Timer write failed for device {} (dp {}): {}",
                    device_id, dp_id, e
                );
            }
        }));
    }
}

fn enqueue(queue: &mpsc::Sender<TimerCommand>, cmd: TimerCommand) -> Result<()> {
    queue.try_send(cmd).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => TimerError::QueueFull,
        mpsc::error::TrySendError::Closed(_) => TimerError::QueueClosed,
    })
}

/// Background task applying timer edits one at a time.
struct WriteQueue {
    device_id: Arc<str>,
    dp_id: DpId,
    validation: Validation,
    store: Arc<dyn DatapointStore>,
}

/// Last value this queue wrote, with the store value seen right before writing it.
struct Written {
    bytes: Vec<u8>,
    store_before: Option<DpValue>,
}

impl WriteQueue {
    async fn run(self, mut rx: mpsc::Receiver<TimerCommand>, cancel: CancellationToken) {
        debug!("Starting timer write queue for device {}", self.device_id);
        let mut last: Option<Written> = None;

        loop {
            let cmd = tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };

            let current = self.store.read(self.dp_id);
            let next = match cmd {
                TimerCommand::Replace(bytes) => bytes,
                TimerCommand::Edit(edit) => {
                    let base = self.base(&current, &last);
                    match base.map(|raw| timer::apply_edit(raw, edit, self.validation)) {
                        Some(Ok(Some(bytes))) => bytes.to_vec(),
                        Some(Ok(None)) | None => {
                            debug!(
                                "Timer value for device {} unknown, dropping {:?}",
                                self.device_id, edit
                            );
                            continue;
                        }
                        Some(Err(e)) => {
                            warn!(
                                "Rejected timer edit {:?} for device {}: {}",
                                edit, self.device_id, e
                            );
                            continue;
                        }
                    }
                }
            };

            debug!(
                "Writing queued timer for device {}: {}",
                self.device_id,
                hex::encode(&next)
            );
            match self.store.write(self.dp_id, DpValue::Raw(next.clone())).await {
                Ok(()) => {
                    last = Some(Written {
                        bytes: next,
                        store_before: current,
                    })
                }
                Err(e) => {
                    error!(
                        "Timer write failed for device {} (dp {}): {}",
                        self.device_id, self.dp_id, e
                    );
                    last = None;
                }
            }
        }

        debug!("Timer write queue for device {} exited", self.device_id);
    }

    /// Our last write while the store still shows what it showed before that write,
    /// otherwise the store's own value.
    fn base<'a>(
        &self,
        current: &'a Option<DpValue>,
        last: &'a Option<Written>,
    ) -> Option<&'a [u8]> {
        match last {
            Some(written) if written.store_before == *current => Some(written.bytes.as_slice()),
            _ => current.as_ref().and_then(DpValue::as_raw),
        }
    }
}
