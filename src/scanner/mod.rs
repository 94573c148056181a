//! Gate scanner - Drives a camera and reports the first QR code it sees.
//!
//! A [`Scanner`] owns the camera backend and at most one open stream. While
//! scanning, a spawned task pulls frames and runs them through the decoder until a
//! code is read, the stream fails, or the scan is cancelled. The decoded text is
//! delivered uninterpreted on [`ScanResults`]; deciding what it means is the job of
//! [`crate::core::redemption`].
//!
//! ```text
//! NoPermission --request_permission--> Idle --start--> Scanning
//!                                       ^                 |
//!                                       +--decode/stop/---+
//!                                          stream error
//! ```

pub mod camera;
pub mod decoder;

pub use camera::{CameraBackend, CameraDevice, Frame, VideoStream};
pub use decoder::{DecodeError, FrameDecoder, QrFrameDecoder};

use crate::errors::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Pause between releasing one camera and opening another.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// How long a torch toggle waits for the decode loop to hand over the stream.
const TORCH_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Where the scanner is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerState {
    /// Camera access not granted (yet)
    NoPermission,
    /// Ready; no stream open
    Idle,
    /// Decode loop running
    Scanning,
}

/// Receiving end for decoded payloads.
#[derive(Debug)]
pub struct ScanResults {
    receiver: mpsc::UnboundedReceiver<String>,
}

impl ScanResults {
    /// Waits for the next decoded payload. `None` once the scanner is dropped.
    pub async fn next(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

struct ActiveScan<S> {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    stream: Arc<Mutex<S>>,
}

/// Camera driver and decode loop.
pub struct Scanner<B: CameraBackend, D: FrameDecoder> {
    backend: B,
    decoder: Arc<D>,
    state: Arc<watch::Sender<ScannerState>>,
    devices: Vec<CameraDevice>,
    selected: Option<String>,
    active: Option<ActiveScan<B::Stream>>,
    torch_on: bool,
    settle_delay: Duration,
    results: mpsc::UnboundedSender<String>,
}

impl<B: CameraBackend, D: FrameDecoder> Scanner<B, D> {
    /// Creates a scanner without camera permission, plus the channel its decodes
    /// arrive on.
    pub fn new(backend: B, decoder: D) -> (Self, ScanResults) {
        let (results, receiver) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ScannerState::NoPermission);
        let scanner = Self {
            backend,
            decoder: Arc::new(decoder),
            state: Arc::new(state),
            devices: Vec::new(),
            selected: None,
            active: None,
            torch_on: false,
            settle_delay: DEFAULT_SETTLE_DELAY,
            results,
        };
        (scanner, ScanResults { receiver })
    }

    /// Overrides [`DEFAULT_SETTLE_DELAY`].
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScannerState {
        *self.state.borrow()
    }

    /// Watches state transitions, including the ones the decode loop makes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ScannerState> {
        self.state.subscribe()
    }

    /// Cameras found when permission was granted.
    #[must_use]
    pub fn devices(&self) -> &[CameraDevice] {
        &self.devices
    }

    /// Camera chosen with [`Scanner::select_device`]; `None` means the backend default.
    #[must_use]
    pub fn selected_device(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Whether the torch is lit on the running stream.
    #[must_use]
    pub fn torch_on(&self) -> bool {
        self.torch_on && self.state() == ScannerState::Scanning
    }

    /// Requests camera access and, once granted, enumerates devices.
    #[instrument(skip(self))]
    pub async fn request_permission(&mut self) -> Result<()> {
        if let Err(e) = self.backend.request_access().await {
            warn!(error = %e, "Camera access refused");
            return Err(Error::CameraPermissionDenied);
        }

        self.devices = self.backend.list_devices().await?;
        info!(devices = self.devices.len(), "Camera access granted");
        self.state.send_if_modified(|state| {
            if *state == ScannerState::NoPermission {
                *state = ScannerState::Idle;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    /// Switches cameras. A running scan is torn down, given time to release the
    /// device, and restarted on the new camera.
    #[instrument(skip(self))]
    pub async fn select_device(&mut self, device_id: &str) -> Result<()> {
        if self.state() == ScannerState::NoPermission {
            return Err(Error::CameraPermissionDenied);
        }
        if !self.devices.iter().any(|d| d.id == device_id) {
            return Err(Error::Camera {
                message: format!("unknown camera '{device_id}'"),
            });
        }

        self.selected = Some(device_id.to_string());
        if self.state() == ScannerState::Scanning {
            self.stop().await;
            tokio::time::sleep(self.settle_delay).await;
            self.start().await?;
        }
        Ok(())
    }

    /// Opens the selected camera and starts decoding. A no-op while scanning.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        match self.state() {
            ScannerState::NoPermission => return Err(Error::CameraPermissionDenied),
            ScannerState::Scanning => return Ok(()),
            ScannerState::Idle => {}
        }
        // The previous loop ended by itself; join it before touching the camera again.
        self.release().await;

        let stream = match self.backend.open(self.selected.as_deref()).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "Failed to open camera");
                return Err(match e {
                    Error::Camera { .. } | Error::CameraPermissionDenied => e,
                    other => Error::Camera {
                        message: other.to_string(),
                    },
                });
            }
        };

        let stream = Arc::new(Mutex::new(stream));
        let cancel = CancellationToken::new();
        self.state.send_replace(ScannerState::Scanning);
        let task = tokio::spawn(decode_loop(
            Arc::clone(&stream),
            Arc::clone(&self.decoder),
            cancel.clone(),
            Arc::clone(&self.state),
            self.results.clone(),
        ));
        self.active = Some(ActiveScan {
            cancel,
            task,
            stream,
        });
        info!(device = ?self.selected, "Scanning started");
        Ok(())
    }

    /// Stops scanning and releases the camera. Safe to call at any time.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) {
        self.release().await;
        self.state.send_if_modified(|state| {
            if *state == ScannerState::Scanning {
                *state = ScannerState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Flips the torch on the running stream. Reports the new state, `false` when
    /// not scanning or the camera has no torch, and the unchanged state when the
    /// camera is stalled.
    pub async fn toggle_torch(&mut self) -> Result<bool> {
        if self.state() != ScannerState::Scanning {
            return Ok(false);
        }
        let Some(active) = &self.active else {
            return Ok(false);
        };

        let Ok(mut stream) = tokio::time::timeout(TORCH_LOCK_TIMEOUT, active.stream.lock()).await
        else {
            warn!("Camera busy; torch left unchanged");
            return Ok(self.torch_on);
        };
        if !stream.supports_torch() {
            return Ok(false);
        }
        let on = !self.torch_on;
        stream.set_torch(on).await?;
        self.torch_on = on;
        debug!(on, "Torch toggled");
        Ok(on)
    }

    /// Cancels the decode loop and waits for it. The loop shuts the stream down on
    /// every exit path, so only a panicked loop leaves cleanup to us.
    async fn release(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Err(e) = active.task.await {
                warn!(error = %e, "Decode loop ended abnormally");
                shut_down(&mut *active.stream.lock().await).await;
            }
        }
        self.torch_on = false;
    }
}

impl<B: CameraBackend, D: FrameDecoder> Drop for Scanner<B, D> {
    // The loop sees the cancellation and releases the camera on its own.
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

/// Turns the torch off (when the camera has one) and stops every track.
async fn shut_down<S: VideoStream>(stream: &mut S) {
    if stream.supports_torch() {
        if let Err(e) = stream.set_torch(false).await {
            debug!(error = %e, "Torch not reset");
        }
    }
    stream.stop().await;
}

async fn decode_loop<S, D>(
    stream: Arc<Mutex<S>>,
    decoder: Arc<D>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<ScannerState>>,
    results: mpsc::UnboundedSender<String>,
) where
    S: VideoStream,
    D: FrameDecoder,
{
    loop {
        let frame = {
            let mut guard = stream.lock().await;
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                frame = guard.next_frame() => Some(frame),
            };
            let Some(frame) = next else {
                shut_down(&mut *guard).await;
                debug!("Scan cancelled; camera released");
                return;
            };
            frame
        };

        match frame {
            Ok(frame) => match decoder.decode(&frame) {
                Ok(text) => {
                    shut_down(&mut *stream.lock().await).await;
                    state.send_replace(ScannerState::Idle);
                    info!("QR code decoded");
                    if results.send(text).is_err() {
                        debug!("Decoded payload dropped; nobody is listening");
                    }
                    return;
                }
                Err(DecodeError::NotFound) => {}
                Err(e) => warn!(error = %e, "Frame decode failed"),
            },
            Err(e) => {
                error!(error = %e, "Camera stream failed; scan ended");
                shut_down(&mut *stream.lock().await).await;
                state.send_replace(ScannerState::Idle);
                return;
            }
        }

        tokio::task::yield_now().await;
    }
}
