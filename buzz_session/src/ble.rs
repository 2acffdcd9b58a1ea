//! Real Buzz over Bluetooth LE (feature = "ble").
//!
//! The Buzz exposes a text command line on the Nordic UART service: each
//! command is written as one newline-terminated line to the RX
//! characteristic.  Motor frames are sent as `motors vibrate <base64>`, one
//! byte per motor.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tracing::{debug, info};
use uuid::Uuid;

use crate::transport::{AuthStep, BuzzTransport, PeripheralInfo, TransportError};
use crate::vector::ActuationVector;

/// Nordic UART RX characteristic: host → device command line.
const COMMAND_CHARACTERISTIC: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

const RESUME_ALGORITHM: &str = "audio start";

pub struct BleBuzz {
    adapter:     Adapter,
    scan_time:   Duration,
    seen:        Vec<Peripheral>,
    link:        Option<(Peripheral, Characteristic)>,
}

impl BleBuzz {
    /// Open the first Bluetooth adapter.  Discovery scans for `scan_time`.
    pub async fn new(scan_time: Duration) -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::AdapterUnavailable("no Bluetooth adapter found".into()))?;
        Ok(BleBuzz { adapter, scan_time, seen: Vec::new(), link: None })
    }

    async fn write_command(&self, command: &str) -> Result<(), TransportError> {
        let (peripheral, characteristic) = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        let line = format!("{}\n", command);
        debug!(command, "buzz command");
        peripheral
            .write(characteristic, line.as_bytes(), WriteType::WithoutResponse)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BuzzTransport for BleBuzz {
    async fn discover(&mut self) -> Result<Vec<PeripheralInfo>, TransportError> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(self.scan_time).await;
        let peripherals = self.adapter.peripherals().await?;
        self.adapter.stop_scan().await?;

        let mut found = Vec::with_capacity(peripherals.len());
        for p in &peripherals {
            let name = p
                .properties()
                .await?
                .and_then(|props| props.local_name)
                .unwrap_or_default();
            found.push(PeripheralInfo { name, address: p.address().to_string() });
        }
        info!(count = found.len(), "scan complete");
        self.seen = peripherals;
        Ok(found)
    }

    async fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        let peripheral = self
            .seen
            .iter()
            .find(|p| p.address().to_string() == address)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeripheral(address.to_string()))?;

        peripheral.connect().await?;
        let characteristic = match command_characteristic(&peripheral, address).await {
            Ok(c) => c,
            Err(e) => {
                // Partial link: drop it before reporting.
                let _ = peripheral.disconnect().await;
                return Err(e);
            }
        };

        info!(connected = peripheral.is_connected().await?, "connection state");
        self.link = Some((peripheral, characteristic));
        Ok(())
    }

    async fn authorize(&mut self, step: AuthStep) -> Result<(), TransportError> {
        self.write_command(step.command()).await
    }

    async fn vibrate(&mut self, frame: &ActuationVector) -> Result<(), TransportError> {
        let encoded = STANDARD.encode(frame.as_slice());
        self.write_command(&format!("motors vibrate {}", encoded)).await
    }

    async fn resume_algorithm(&mut self) -> Result<(), TransportError> {
        self.write_command(RESUME_ALGORITHM).await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some((peripheral, _)) = self.link.take() {
            peripheral.disconnect().await?;
        }
        Ok(())
    }
}

async fn command_characteristic(
    peripheral: &Peripheral,
    address:    &str,
) -> Result<Characteristic, TransportError> {
    peripheral.discover_services().await?;
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == COMMAND_CHARACTERISTIC)
        .ok_or_else(|| TransportError::MissingCharacteristic(address.to_string()))
}
