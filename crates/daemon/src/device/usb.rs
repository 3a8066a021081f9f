//! USB bulk-endpoint report source

use super::report::INIT_SEQUENCE;
use super::source::{ByteReports, DeviceError, ReadOutcome, ReportSource};
use crate::config::DeviceFilter;
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout for each init sequence write
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Interface and bulk endpoints used for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BulkEndpoints {
    interface: u8,
    input: u8,
    output: Option<u8>,
}

struct OpenDevice {
    handle: DeviceHandle<Context>,
    endpoints: BulkEndpoints,
    description: String,
}

/// Reads one-byte reports from the first USB device matching a filter
pub struct UsbSource {
    filter: DeviceFilter,
    send_init: bool,
    device: Option<OpenDevice>,
    reports: ByteReports,
}

impl UsbSource {
    pub fn new(filter: DeviceFilter, send_init: bool) -> Self {
        Self {
            filter,
            send_init,
            device: None,
            reports: ByteReports::new(),
        }
    }

    fn open_device(&self, device: &Device<Context>) -> Result<Option<OpenDevice>, DeviceError> {
        let Some(endpoints) = find_bulk_endpoints(device)? else {
            debug!(
                "Device {:03}:{:03} has no bulk IN endpoint, skipping",
                device.bus_number(),
                device.address()
            );
            return Ok(None);
        };

        let mut handle = device.open().map_err(|e| match e {
            rusb::Error::Access => DeviceError::PermissionDenied(format!(
                "bus {:03} address {:03} (check udev rules)",
                device.bus_number(),
                device.address()
            )),
            other => DeviceError::Usb(other),
        })?;

        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach not supported: {}", e);
        }
        handle.claim_interface(endpoints.interface)?;

        if self.send_init {
            match endpoints.output {
                Some(out) => {
                    for chunk in INIT_SEQUENCE {
                        handle.write_bulk(out, chunk, WRITE_TIMEOUT)?;
                    }
                    debug!("Sent init sequence to endpoint {:#04x}", out);
                }
                None => warn!("No bulk OUT endpoint, init sequence not sent"),
            }
        }

        let description = describe_device(device, &handle);
        Ok(Some(OpenDevice {
            handle,
            endpoints,
            description,
        }))
    }
}

impl ReportSource for UsbSource {
    fn open(&mut self) -> Result<(), DeviceError> {
        self.close();

        let context = Context::new()?;
        for device in context.devices()?.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    debug!("Failed to read device descriptor: {}", e);
                    continue;
                }
            };
            if !self
                .filter
                .matches(descriptor.vendor_id(), descriptor.product_id())
            {
                continue;
            }

            if let Some(open) = self.open_device(&device)? {
                info!("Opened {}", open.description);
                self.device = Some(open);
                return Ok(());
            }
        }

        Err(DeviceError::NotFound(self.filter.to_string()))
    }

    fn read_report(&mut self, timeout: Duration) -> Result<ReadOutcome, DeviceError> {
        if let Some(report) = self.reports.pop() {
            return Ok(ReadOutcome::Report(report));
        }

        let device = self.device.as_ref().ok_or(DeviceError::NotOpen)?;
        self.reports.refill(|buf| {
            match device
                .handle
                .read_bulk(device.endpoints.input, buf, timeout)
            {
                Ok(read) => Ok(read),
                Err(rusb::Error::Timeout) => Ok(0),
                Err(rusb::Error::NoDevice) => Err(DeviceError::Disconnected),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.handle.release_interface(device.endpoints.interface) {
                debug!("Failed to release interface: {}", e);
            }
            debug!("Closed {}", device.description);
        }
    }

    fn describe(&self) -> String {
        match &self.device {
            Some(device) => device.description.clone(),
            None => format!("USB device {}", self.filter),
        }
    }
}

/// First interface alternate setting with a bulk IN endpoint
fn find_bulk_endpoints(device: &Device<Context>) -> Result<Option<BulkEndpoints>, DeviceError> {
    let config = device.active_config_descriptor()?;

    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            let mut input = None;
            let mut output = None;
            for endpoint in descriptor.endpoint_descriptors() {
                if endpoint.transfer_type() != TransferType::Bulk {
                    continue;
                }
                match endpoint.direction() {
                    Direction::In if input.is_none() => input = Some(endpoint.address()),
                    Direction::Out if output.is_none() => output = Some(endpoint.address()),
                    _ => {}
                }
            }

            if let Some(input) = input {
                return Ok(Some(BulkEndpoints {
                    interface: descriptor.interface_number(),
                    input,
                    output,
                }));
            }
        }
    }

    Ok(None)
}

fn describe_device(device: &Device<Context>, handle: &DeviceHandle<Context>) -> String {
    let product = device
        .device_descriptor()
        .ok()
        .and_then(|descriptor| handle.read_product_string_ascii(&descriptor).ok())
        .unwrap_or_else(|| "TourBox".to_string());
    format!(
        "{} (bus {:03} address {:03})",
        product,
        device.bus_number(),
        device.address()
    )
}

/// One row of `--list-devices` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus: u8,
    pub address: u8,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub matches_filter: bool,
}

/// Enumerate attached USB devices
///
/// String descriptors are only read when the device can be opened, so
/// unreadable devices still show up with their IDs.
pub fn list_devices(filter: &DeviceFilter) -> Result<Vec<UsbDeviceSummary>, DeviceError> {
    let context = Context::new()?;
    let mut summaries = Vec::new();

    for device in context.devices()?.iter() {
        let Ok(descriptor) = device.device_descriptor() else {
            continue;
        };

        let (manufacturer, product) = match device.open() {
            Ok(handle) => (
                handle.read_manufacturer_string_ascii(&descriptor).ok(),
                handle.read_product_string_ascii(&descriptor).ok(),
            ),
            Err(_) => (None, None),
        };

        summaries.push(UsbDeviceSummary {
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            bus: device.bus_number(),
            address: device.address(),
            manufacturer,
            product,
            matches_filter: filter.matches(descriptor.vendor_id(), descriptor.product_id()),
        });
    }

    Ok(summaries)
}
