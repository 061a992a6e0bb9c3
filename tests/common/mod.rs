// tests/common/mod.rs — Shared helpers for the integration tests.
//
// `EmulatedDevice` stands in for an offload backend on machines without a
// GPU adapter: it owns private copies of the source and destination (its
// "device memory"), evaluates the kernel on its own OS threads using the
// work items of the requested strategy, and records every protocol call so
// tests can check the staging order.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;

use sobel_offload::kernel::evaluate;
use sobel_offload::offload::{DeviceStager, Launch};
use sobel_offload::partition::{work_items, PartitionParams, ValidRegion};
use sobel_offload::{RasterView, Result, SobelError};

/// Fill value of the emulated destination before dispatch. Margin bytes
/// come back with this value, which the engine must never copy out.
pub const DEVICE_GARBAGE: u8 = 0xEE;

pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

pub struct EmulatedDevice {
    calls: CallLog,
    src: Option<(Vec<u8>, usize, usize)>,
    dst: Option<Vec<u8>>,
    dispatched: bool,
    fail_dispatch: bool,
    capacity: Option<usize>,
}

impl EmulatedDevice {
    pub fn new() -> (Self, CallLog) {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let dev = EmulatedDevice {
            calls: Arc::clone(&calls),
            src: None,
            dst: None,
            dispatched: false,
            fail_dispatch: false,
            capacity: None,
        };
        (dev, calls)
    }

    /// A device whose dispatch reports the device as lost.
    pub fn failing_dispatch() -> (Self, CallLog) {
        let (mut dev, calls) = Self::new();
        dev.fail_dispatch = true;
        (dev, calls)
    }

    /// A device whose memory holds at most `bytes` source bytes.
    pub fn with_capacity(bytes: usize) -> (Self, CallLog) {
        let (mut dev, calls) = Self::new();
        dev.capacity = Some(bytes);
        (dev, calls)
    }

    fn log(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DeviceStager for EmulatedDevice {
    fn describe(&self) -> String {
        "emulated device".into()
    }

    fn stage_in(&mut self, src: RasterView<'_>) -> Result<()> {
        self.log("stage_in");
        if self.src.is_some() {
            return Err(SobelError::StagingOrder("stage_in while staged"));
        }
        let (w, h) = (src.width(), src.height());
        if let Some(cap) = self.capacity.filter(|&cap| w * h > cap) {
            return Err(SobelError::DeviceUnavailable {
                reason: format!("{w}×{h} raster exceeds {cap} bytes of device memory"),
            });
        }
        self.src = Some((src.as_slice().to_vec(), w, h));
        self.dst = Some(vec![DEVICE_GARBAGE; w * h]);
        self.dispatched = false;
        Ok(())
    }

    fn dispatch(&mut self, launch: &Launch) -> Result<()> {
        self.log("dispatch");
        if self.fail_dispatch {
            return Err(SobelError::DeviceUnavailable { reason: "device lost".into() });
        }
        let (data, w, h) = self
            .src
            .as_ref()
            .ok_or(SobelError::StagingOrder("dispatch before stage_in"))?;
        let (w, h) = (*w, *h);
        let view = RasterView::new(data, w, h)?;
        let region = ValidRegion::of(w, h)?;
        let params = PartitionParams {
            workers: 3,
            teams: (launch.teams as usize).clamp(1, 8),
            row_grain: 2,
            column_tile: 5,
        };
        let items = work_items(launch.strategy, region, &params);

        // One OS thread per work item; results are gathered and written
        // into device memory after the join.
        let results: Vec<(usize, usize, Vec<u8>)> = thread::scope(|s| {
            let handles: Vec<_> = items
                .iter()
                .map(|item| {
                    let item = item.clone();
                    s.spawn(move || {
                        let mut out = Vec::new();
                        for row in item.rows.clone() {
                            let bytes: Vec<u8> = item
                                .cols
                                .clone()
                                .map(|col| evaluate(&view, row, col, launch.policy))
                                .collect();
                            out.push((row, item.cols.start, bytes));
                        }
                        out
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        let dst = self.dst.as_mut().ok_or(SobelError::StagingOrder("no destination"))?;
        for (row, col, bytes) in results {
            let start = row * w + col;
            dst[start..start + bytes.len()].copy_from_slice(&bytes);
        }
        self.dispatched = true;
        Ok(())
    }

    fn stage_out(&mut self) -> Result<Vec<u8>> {
        self.log("stage_out");
        if !self.dispatched {
            return Err(SobelError::StagingOrder("stage_out before dispatch"));
        }
        self.src = None;
        self.dispatched = false;
        self.dst.take().ok_or(SobelError::StagingOrder("stage_out before stage_in"))
    }

    fn release(&mut self) {
        self.log("release");
        self.src = None;
        self.dst = None;
        self.dispatched = false;
    }
}

/// A device that can never be reached.
pub struct OfflineDevice;

impl DeviceStager for OfflineDevice {
    fn describe(&self) -> String {
        "offline device".into()
    }
    fn stage_in(&mut self, _src: RasterView<'_>) -> Result<()> {
        Err(SobelError::DeviceUnavailable { reason: "adapter not present".into() })
    }
    fn dispatch(&mut self, _launch: &Launch) -> Result<()> {
        Err(SobelError::StagingOrder("dispatch before stage_in"))
    }
    fn stage_out(&mut self) -> Result<Vec<u8>> {
        Err(SobelError::StagingOrder("stage_out before stage_in"))
    }
    fn release(&mut self) {}
}
