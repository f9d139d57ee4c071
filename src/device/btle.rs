use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use btleplug::api::{Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{SinkExt, Stream, StreamExt};
use futures::channel::mpsc::{channel, unbounded, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use log::{debug, info, warn};
use tokio::spawn;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::RADIO_EVENT_CAPACITY;
use crate::device::driver::RadioDriver;
use crate::device::types::{ConnectionHandle, DiscoveredService, GattStatus, LinkState, RadioEvent};
use crate::error::DriverError;

type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Scan requests are applied one at a time, in the order they were made, so that a slow stop
/// can never land after the start that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanRequest {
    Start(Vec<Uuid>),
    Stop,
}

struct Link {
    cancel: CancellationToken,
    peripheral: Option<Peripheral>,
}

struct Inner {
    // kept alive for as long as the adapter is in use
    _manager: Manager,
    adapter: Adapter,
    events: Sender<RadioEvent>,
    powered: AtomicBool,
    scanning: AtomicBool,
    links: Mutex<HashMap<ConnectionHandle, Link>>,
}

impl Inner {
    async fn emit(&self, event: RadioEvent) {
        let mut sender = self.events.clone();
        if let Err(err) = sender.send(event).await {
            debug!("Dropping radio event, nobody is listening: {}", err);
        }
    }

    fn links(&self) -> MutexGuard<'_, HashMap<ConnectionHandle, Link>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn peripheral(&self, handle: ConnectionHandle) -> Result<Peripheral, DriverError> {
        self.links()
            .get(&handle)
            .and_then(|link| link.peripheral.clone())
            .ok_or(DriverError::NotConnected { handle: handle.0 })
    }

    fn handle_of(&self, id: &PeripheralId) -> Option<ConnectionHandle> {
        self.links()
            .iter()
            .find(|(_, link)| link.peripheral.as_ref().map_or(false, |peripheral| &peripheral.id() == id))
            .map(|(handle, _)| *handle)
    }
}

/// `RadioDriver` on top of the first bluetooth adapter reported by `btleplug`.
///
/// Connection requests are run on spawned tokio tasks, scan requests on a single ordered
/// worker. Results come back on the receiver returned from `BtleplugDriver::new`.
#[derive(Clone)]
pub struct BtleplugDriver {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    scan_requests: UnboundedSender<ScanRequest>,
}

impl fmt::Debug for BtleplugDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BtleplugDriver")
            .field("powered", &self.inner.powered.load(Ordering::SeqCst))
            .field("scanning", &self.inner.scanning.load(Ordering::SeqCst))
            .finish()
    }
}

impl BtleplugDriver {
    pub async fn new(cancel: CancellationToken) -> Result<(Self, Receiver<RadioEvent>), DriverError> {
        let manager = Manager::new().await?;
        let adapter = manager.adapters().await?
            .into_iter()
            .next()
            .ok_or(DriverError::NoAdapter)?;

        info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));

        // Some platforms only ever report Unknown, assume the radio is usable then
        let powered = match adapter.adapter_state().await {
            Ok(CentralState::PoweredOff) => false,
            Ok(_) => true,
            Err(err) => {
                warn!("Could not query adapter state: {:?}", err);
                true
            },
        };

        let central_events = adapter.events().await?;
        let (sender, receiver) = channel::<RadioEvent>(RADIO_EVENT_CAPACITY);

        let inner = Arc::new(Inner {
            _manager: manager,
            adapter,
            events: sender,
            powered: AtomicBool::new(powered),
            scanning: AtomicBool::new(false),
            links: Mutex::new(HashMap::new()),
        });

        spawn(pump_central_events(inner.clone(), central_events, cancel.clone()));

        // ends once every clone of the driver is gone, after the final stop has been applied
        let (scan_requests, scan_receiver) = unbounded::<ScanRequest>();
        let scan_inner = inner.clone();
        spawn(run_scan_requests(scan_receiver, move |request| {
            let inner = scan_inner.clone();
            async move { apply_scan_request(&inner, request).await }
        }));

        Ok((BtleplugDriver { inner, cancel, scan_requests }, receiver))
    }

    fn send_scan_request(&self, request: ScanRequest) {
        if let Err(err) = self.scan_requests.unbounded_send(request) {
            warn!("Scan request dropped, the scan worker is gone: {}", err);
        }
    }
}

async fn run_scan_requests<F, Fut>(mut requests: UnboundedReceiver<ScanRequest>, mut apply: F)
where
    F: FnMut(ScanRequest) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(request) = requests.next().await {
        apply(request).await;
    }
    debug!("Scan worker finished");
}

async fn apply_scan_request(inner: &Inner, request: ScanRequest) {
    match request {
        ScanRequest::Start(services) => {
            inner.scanning.store(true, Ordering::SeqCst);

            if let Err(err) = inner.adapter.start_scan(ScanFilter { services }).await {
                warn!("Scanning failed {:?}", err);
                inner.scanning.store(false, Ordering::SeqCst);

                let permission_denied = matches!(err, btleplug::Error::PermissionDenied);
                inner.emit(RadioEvent::ScanFailed { permission_denied }).await;
            }
        },
        ScanRequest::Stop => {
            inner.scanning.store(false, Ordering::SeqCst);

            if let Err(err) = inner.adapter.stop_scan().await {
                warn!("Failed to stop scan: {:?}", err);
            }
        },
    }
}

async fn pump_central_events(inner: Arc<Inner>, mut central_events: CentralEvents, cancel: CancellationToken) {
    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            event = central_events.next() => match event {
                None => {
                    warn!("Adapter event stream ended");
                    break 'mainloop;
                },
                Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                    if inner.scanning.load(Ordering::SeqCst) {
                        report_discovery(&inner, &id).await;
                    }
                },
                Some(CentralEvent::DeviceDisconnected(id)) => {
                    if let Some(handle) = inner.handle_of(&id) {
                        info!("Peripheral disconnected ({})", handle);
                        inner.links().remove(&handle);
                        inner.emit(RadioEvent::LinkChanged {
                            handle,
                            state: LinkState::Disconnected,
                            status: GattStatus::Success,
                        }).await;
                    }
                },
                Some(CentralEvent::StateUpdate(state)) => {
                    let powered = !matches!(state, CentralState::PoweredOff);
                    inner.powered.store(powered, Ordering::SeqCst);
                    inner.emit(RadioEvent::RadioStateChanged { powered }).await;
                },
                Some(_) => {},
            },
        }
    }
}

/// The address handed to the controller. CoreBluetooth reports every hardware address as
/// 00:00:00:00:00:00, the platform id is the only identity that is unique on every backend.
fn peripheral_address(peripheral: &Peripheral) -> String {
    peripheral.id().to_string()
}

fn pick_by_address<P>(candidates: impl IntoIterator<Item = P>, address: &str, address_of: impl Fn(&P) -> String) -> Option<P> {
    candidates.into_iter().find(|candidate| address_of(candidate) == address)
}

async fn report_discovery(inner: &Inner, id: &PeripheralId) {
    let peripheral = match inner.adapter.peripheral(id).await {
        Ok(peripheral) => peripheral,
        Err(err) => {
            warn!("Could not look up discovered peripheral: {:?}", err);
            return;
        },
    };

    match peripheral.properties().await {
        Err(err) => {
            warn!("Could not query peripheral for properties: {:?}", err);
        },
        Ok(None) => {
            debug!("Peripheral has no properties");
        },
        Ok(Some(properties)) => {
            inner.emit(RadioEvent::DeviceDiscovered {
                name: properties.local_name,
                address: peripheral_address(&peripheral),
            }).await;
        },
    }
}

async fn find_peripheral(adapter: &Adapter, address: &str) -> Result<Peripheral, DriverError> {
    let peripherals = adapter.peripherals().await?;

    pick_by_address(peripherals, address, peripheral_address)
        .ok_or_else(|| DriverError::UnknownPeripheral { address: address.to_string() })
}

async fn connect_peripheral(inner: &Inner, address: &str, handle: ConnectionHandle) -> Result<(), DriverError> {
    let peripheral = find_peripheral(&inner.adapter, address).await?;

    // disconnect() may have dropped the link while we were looking
    let registered = {
        let mut links = inner.links();
        match links.get_mut(&handle) {
            Some(link) => {
                link.peripheral = Some(peripheral.clone());
                true
            },
            None => false,
        }
    };

    if !registered {
        return Err(DriverError::NotConnected { handle: handle.0 });
    }

    peripheral.connect().await?;
    Ok(())
}

async fn discover(inner: &Inner, handle: ConnectionHandle) -> Result<Vec<DiscoveredService>, DriverError> {
    let peripheral = inner.peripheral(handle)?;
    peripheral.discover_services().await?;

    let services = peripheral
        .services()
        .into_iter()
        .map(|service| DiscoveredService {
            uuid: service.uuid,
            characteristics: service.characteristics.iter().map(|characteristic| characteristic.uuid).collect(),
        })
        .collect();

    Ok(services)
}

async fn read(inner: &Inner, handle: ConnectionHandle, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, DriverError> {
    let peripheral = inner.peripheral(handle)?;

    let found = peripheral
        .characteristics()
        .into_iter()
        .find(|candidate| candidate.service_uuid == service && candidate.uuid == characteristic)
        .ok_or(DriverError::MissingCharacteristic)?;

    Ok(peripheral.read(&found).await?)
}

impl RadioDriver for BtleplugDriver {
    fn radio_powered(&self) -> bool {
        self.inner.powered.load(Ordering::SeqCst)
    }

    fn scan_start(&self, services: Vec<Uuid>) {
        self.send_scan_request(ScanRequest::Start(services));
    }

    fn scan_stop(&self) {
        self.send_scan_request(ScanRequest::Stop);
    }

    fn connect(&self, address: &str, handle: ConnectionHandle) {
        let inner = self.inner.clone();
        let address = address.to_string();
        let cancel = self.cancel.child_token();

        inner.links().insert(handle, Link { cancel: cancel.clone(), peripheral: None });

        spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Connect {} abandoned", handle);
                    return;
                },
                result = connect_peripheral(&inner, &address, handle) => result,
            };

            match result {
                Ok(()) => {
                    inner.emit(RadioEvent::LinkChanged {
                        handle,
                        state: LinkState::Connected,
                        status: GattStatus::Success,
                    }).await;
                },
                Err(err) => {
                    warn!("Connecting to peripheral failed: {}", err);
                    inner.links().remove(&handle);
                    inner.emit(RadioEvent::LinkChanged {
                        handle,
                        state: LinkState::Disconnected,
                        status: GattStatus::Failure,
                    }).await;
                },
            }
        });
    }

    fn discover_services(&self, handle: ConnectionHandle) {
        let inner = self.inner.clone();

        spawn(async move {
            let (status, services) = match discover(&inner, handle).await {
                Ok(services) => (GattStatus::Success, services),
                Err(err) => {
                    warn!("Discovering services failed: {}", err);
                    (GattStatus::Failure, vec![])
                },
            };

            inner.emit(RadioEvent::ServicesDiscovered { handle, status, services }).await;
        });
    }

    fn read_characteristic(&self, handle: ConnectionHandle, service: Uuid, characteristic: Uuid) {
        let inner = self.inner.clone();

        spawn(async move {
            let (status, value) = match read(&inner, handle, service, characteristic).await {
                Ok(value) => (GattStatus::Success, value),
                Err(err) => {
                    warn!("Reading characteristic failed: {}", err);
                    (GattStatus::Failure, vec![])
                },
            };

            inner.emit(RadioEvent::CharacteristicRead { handle, status, value }).await;
        });
    }

    fn disconnect(&self, handle: ConnectionHandle) {
        let inner = self.inner.clone();
        let link = inner.links().remove(&handle);

        let Some(link) = link else {
            debug!("Disconnect of unknown connection {}", handle);
            return;
        };
        link.cancel.cancel();

        spawn(async move {
            if let Some(peripheral) = link.peripheral {
                if let Err(err) = peripheral.disconnect().await {
                    warn!("Failed to disconnect from peripheral: {:?}", err);
                }
            }

            inner.emit(RadioEvent::LinkChanged {
                handle,
                state: LinkState::Disconnected,
                status: GattStatus::Success,
            }).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use super::*;

    #[tokio::test]
    async fn stop_then_start_are_applied_in_order() {
        let (sender, receiver) = unbounded::<ScanRequest>();
        let applied = Arc::new(Mutex::new(Vec::new()));

        let log = applied.clone();
        let worker = spawn(run_scan_requests(receiver, move |request| {
            let log = log.clone();
            async move {
                if request == ScanRequest::Stop {
                    // the adapter is slow to stop
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                log.lock().unwrap().push(request);
            }
        }));

        sender.unbounded_send(ScanRequest::Stop).unwrap();
        sender.unbounded_send(ScanRequest::Start(vec![])).unwrap();
        drop(sender);
        worker.await.unwrap();

        assert_eq!(*applied.lock().unwrap(), vec![ScanRequest::Stop, ScanRequest::Start(vec![])]);
    }

    #[test]
    fn peripherals_are_picked_by_platform_id() {
        // hardware addresses as CoreBluetooth reports them, ids as the platform assigns them
        let peripherals = vec![
            ("00:00:00:00:00:00", "5A1B2C3D-THERMO"),
            ("00:00:00:00:00:00", "9F8E7D6C-SCALE"),
        ];

        let picked = pick_by_address(peripherals.clone(), "9F8E7D6C-SCALE", |(_, id)| id.to_string());
        assert_eq!(picked, Some(("00:00:00:00:00:00", "9F8E7D6C-SCALE")));

        assert_eq!(pick_by_address(peripherals, "00:00:00:00:00:00", |(_, id)| id.to_string()), None);
    }
}
