//! USB device driver glue.
//!
//! [`UsbDriver`] sits between a USB device stack and the USB controller
//! driver. The stack calls the driver's device-driver operations
//! ([`ep_open`](UsbDriver::ep_open), [`tx_start`](UsbDriver::tx_start),
//! ...). The driver turns them into USB request blocks ([`Urb`]) for the
//! [`UsbController`], and forwards the controller's notifications to the
//! stack's [`UsbCore`].
//!
//! The driver keeps one URB per endpoint and direction. Endpoint zero
//! shares one URB for both directions.
//!
//! With the `usb-queue` feature, a transfer that starts while its
//! endpoint is busy waits in a short per-endpoint queue. The driver
//! submits queued transmissions as earlier ones complete, and queued
//! receptions as the stack collects earlier ones.

#[cfg(feature = "usb-queue")]
use heapless::Deque;

/// The highest endpoint number, not counting endpoint zero.
pub const MAX_ENDPOINT: u8 = 4;

/// The number of URBs. Endpoint zero takes one, every other endpoint takes
/// one per direction.
pub const URB_COUNT: usize = 2 * MAX_ENDPOINT as usize + 1;

/// Transfers that can wait on a busy endpoint.
#[cfg(feature = "usb-queue")]
pub const QUEUE_DEPTH: usize = 1;

/// An endpoint address.
///
/// Bits 0 to 3 are the endpoint number. Bit 7 is set for IN endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointAddress(pub u8);

impl EndpointAddress {
    /// Endpoint zero, OUT.
    pub const ZERO: Self = Self(0);

    pub const fn number(self) -> u8 {
        self.0 & 0x0f
    }

    pub const fn is_in(self) -> bool {
        self.0 & 0x80 != 0
    }

    /// The index of the endpoint's URB.
    ///
    /// Endpoint zero maps to zero. IN endpoint `n` maps to `2n - 1`, and OUT
    /// endpoint `n` maps to `2n`. Endpoints past [`MAX_ENDPOINT`] map past
    /// the end of the URB table.
    pub const fn urb_index(self) -> usize {
        let number = self.number() as usize;
        if number == 0 {
            0
        } else if self.is_in() {
            2 * number - 1
        } else {
            2 * number
        }
    }
}

/// An endpoint descriptor, as handed to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointDescriptor {
    pub address: EndpointAddress,
    /// Transfer type in bits 0 and 1.
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Host to device.
    Rx,
    /// Device to host.
    Tx,
}

/// A USB request block, one unit of transfer work for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Urb {
    pub endpoint: EndpointAddress,
    pub direction: Direction,
    /// Null for zero length packets.
    pub data: *mut u8,
    pub len: usize,
    /// Bytes moved so far.
    pub processed: usize,
    /// The device number.
    pub device: u8,
}

impl Urb {
    const IDLE: Self = Self {
        endpoint: EndpointAddress::ZERO,
        direction: Direction::Rx,
        data: core::ptr::null_mut(),
        len: 0,
        processed: 0,
        device: 0,
    };
}

/// Result codes from the USB controller driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    Success,
    Fail,
    InvalidState,
    EndpointAlloc,
    NoEndpoint,
    InvalidEndpoint,
    Stalled,
    Halted,
    Overflow,
    Timeout,
    NullPointer,
    InvalidArgument,
    DeviceAlloc,
    UrbComplete,
    UrbPending,
    UrbAborted,
    Disconnected,
    NotSupported,
}

/// Errors reported to the USB device stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackError {
    Fail,
    DeviceInvalidState,
    EndpointAlloc,
    EndpointNoneAvailable,
    EndpointInvalidAddress,
    EndpointStall,
    NullPointer,
    InvalidArgument,
    DeviceAlloc,
    /// The endpoint is busy, and there's no room to queue the transfer.
    EndpointQueuing,
}

/// Stack error for each controller status, indexed by status.
const STATUS_MAP: [Option<StackError>; 18] = [
    None,
    Some(StackError::Fail),
    Some(StackError::DeviceInvalidState),
    Some(StackError::EndpointAlloc),
    Some(StackError::EndpointNoneAvailable),
    Some(StackError::EndpointInvalidAddress),
    Some(StackError::EndpointStall),
    Some(StackError::EndpointStall),
    Some(StackError::Fail),
    Some(StackError::Fail),
    Some(StackError::NullPointer),
    Some(StackError::InvalidArgument),
    Some(StackError::DeviceAlloc),
    None,
    None,
    Some(StackError::Fail),
    Some(StackError::Fail),
    Some(StackError::Fail),
];

impl Status {
    /// Translate the controller's status for the device stack.
    pub const fn into_result(self) -> Result<(), StackError> {
        match STATUS_MAP[self as usize] {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

/// Bus conditions reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusEvent {
    Connect,
    Disconnect,
    Suspend,
    Resume,
    Reset,
    HighSpeed,
}

/// Something that the controller wants the stack to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Notification {
    Bus(BusEvent),
    /// Endpoint zero received a setup packet.
    Setup([u8; 8]),
    /// The controller finished with a URB.
    Urb {
        endpoint: EndpointAddress,
        direction: Direction,
        status: Status,
        processed: usize,
    },
}

/// The USB controller driver.
pub trait UsbController {
    fn init(&mut self, device: u8) -> Status;
    fn start(&mut self);
    fn stop(&mut self);
    fn set_address(&mut self, address: u8);
    fn frame_number(&self) -> u16;
    fn ep_open(&mut self, descriptor: &EndpointDescriptor, device: u8) -> Status;
    fn ep_close(&mut self, endpoint: EndpointAddress);
    /// Returns `true` if the endpoint has no URB in flight.
    fn urb_free(&self, endpoint: EndpointAddress) -> bool;
    /// Start moving a URB.
    ///
    /// # Safety
    ///
    /// Unless `urb.data` is null, it's valid for `urb.len` bytes until the
    /// controller reports the URB, or until the endpoint aborts.
    unsafe fn submit_urb(&mut self, urb: &Urb) -> Status;
    fn ep_stall(&mut self, endpoint: EndpointAddress, stall: bool) -> Status;
    fn ep_abort(&mut self, endpoint: EndpointAddress) -> Status;
    /// Take the next pending notification.
    fn poll(&mut self) -> Option<Notification>;
}

/// The USB device stack's event interface.
pub trait UsbCore {
    fn connect(&mut self);
    fn disconnect(&mut self);
    fn suspend(&mut self);
    fn resume(&mut self);
    fn reset(&mut self);
    fn high_speed(&mut self);
    fn setup(&mut self, packet: &[u8; 8]);
    fn rx_complete(&mut self, endpoint: EndpointAddress);
    fn tx_complete(&mut self, endpoint: EndpointAddress);
}

#[cfg(feature = "usb-queue")]
#[derive(Clone, Copy)]
struct Pending {
    data: *mut u8,
    len: usize,
}

struct Slot {
    urb: Urb,
    #[cfg(feature = "usb-queue")]
    queue: Deque<Pending, QUEUE_DEPTH>,
}

impl Slot {
    fn new() -> Self {
        Self {
            urb: Urb::IDLE,
            #[cfg(feature = "usb-queue")]
            queue: Deque::new(),
        }
    }

    fn is_queue_empty(&self) -> bool {
        #[cfg(feature = "usb-queue")]
        return self.queue.is_empty();
        #[cfg(not(feature = "usb-queue"))]
        true
    }
}

/// Adapts a [`UsbController`] to a USB device stack.
pub struct UsbDriver<C, S> {
    controller: C,
    core: S,
    device: u8,
    urbs: [Slot; URB_COUNT],
    ep0_open: bool,
}

impl<C: UsbController, S: UsbCore> UsbDriver<C, S> {
    /// Adapt `controller` for device number `device`.
    pub fn new(controller: C, core: S, device: u8) -> Self {
        Self {
            controller,
            core,
            device,
            urbs: core::array::from_fn(|_| Slot::new()),
            ep0_open: false,
        }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn core(&self) -> &S {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut S {
        &mut self.core
    }

    pub fn init(&mut self) -> Result<(), StackError> {
        self.controller.init(self.device).into_result()?;
        debug!("USB device {} initialized", self.device);
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), StackError> {
        self.controller.start();
        Ok(())
    }

    pub fn stop(&mut self) {
        self.controller.stop();
    }

    pub fn addr_set(&mut self, address: u8) -> bool {
        self.controller.set_address(address);
        true
    }

    /// The controller applies the address itself.
    pub fn addr_en(&mut self, _address: u8) {}

    pub fn cfg_set(&mut self, _configuration: u8) -> bool {
        true
    }

    pub fn cfg_clr(&mut self, _configuration: u8) {}

    pub fn frame_number(&self) -> u16 {
        self.controller.frame_number()
    }

    /// Open an endpoint.
    ///
    /// Both directions of endpoint zero open together. Opening endpoint
    /// zero again, before closing it, does nothing.
    pub fn ep_open(
        &mut self,
        endpoint: EndpointAddress,
        attributes: u8,
        max_packet_size: u16,
        interval: u8,
    ) -> Result<(), StackError> {
        if usize::from(endpoint.number()) > usize::from(MAX_ENDPOINT) {
            return Err(StackError::EndpointInvalidAddress);
        }
        let address = if endpoint.0 & 0x7f != 0 {
            endpoint
        } else {
            EndpointAddress::ZERO
        };
        if address == EndpointAddress::ZERO {
            if self.ep0_open {
                return Ok(());
            }
            self.ep0_open = true;
        }
        let descriptor = EndpointDescriptor {
            address,
            attributes,
            max_packet_size,
            interval,
        };
        self.controller
            .ep_open(&descriptor, self.device)
            .into_result()?;
        debug!("USB endpoint {} open", address.0);
        Ok(())
    }

    pub fn ep_close(&mut self, endpoint: EndpointAddress) {
        if endpoint.0 & 0x7f == 0 {
            self.ep0_open = false;
        }
        self.controller.ep_close(endpoint);
    }

    /// The endpoint's URB slot. `None` past [`MAX_ENDPOINT`].
    fn urb(&mut self, endpoint: EndpointAddress) -> Option<&mut Slot> {
        self.urbs.get_mut(endpoint.urb_index())
    }

    fn submit(
        &mut self,
        endpoint: EndpointAddress,
        direction: Direction,
        data: *mut u8,
        len: usize,
    ) -> Result<(), StackError> {
        let slot = self
            .urbs
            .get_mut(endpoint.urb_index())
            .ok_or(StackError::EndpointInvalidAddress)?;
        slot.urb = Urb {
            endpoint,
            direction,
            data,
            len,
            processed: 0,
            device: self.device,
        };
        trace!("USB endpoint {} submit {} bytes", endpoint.0, len);
        // Safety: the stack promised that the buffer outlives the
        // transfer when it started it.
        unsafe { self.controller.submit_urb(&slot.urb) }.into_result()
    }

    /// Hold a transfer until the endpoint is free.
    #[cfg_attr(not(feature = "usb-queue"), allow(unused_variables))]
    fn enqueue(
        &mut self,
        endpoint: EndpointAddress,
        data: *mut u8,
        len: usize,
    ) -> Result<(), StackError> {
        #[cfg(feature = "usb-queue")]
        {
            self.urb(endpoint)
                .ok_or(StackError::EndpointInvalidAddress)?
                .queue
                .push_back(Pending { data, len })
                .map_err(|_| StackError::EndpointQueuing)?;
            trace!("USB endpoint {} queued {} bytes", endpoint.0, len);
            Ok(())
        }
        #[cfg(not(feature = "usb-queue"))]
        Err(StackError::EndpointQueuing)
    }

    /// Submit the next queued transfer, if there is one.
    #[cfg_attr(not(feature = "usb-queue"), allow(unused_variables))]
    fn dequeue(&mut self, endpoint: EndpointAddress, direction: Direction) {
        #[cfg(feature = "usb-queue")]
        if let Some(next) = self.urb(endpoint).and_then(|slot| slot.queue.pop_front()) {
            if self
                .submit(endpoint, direction, next.data, next.len)
                .is_err()
            {
                warn!("USB endpoint {} dropped a queued transfer", endpoint.0);
            }
        }
    }

    /// Start receiving into `data`.
    ///
    /// Returns the number of bytes that the transfer can receive. If the
    /// endpoint is busy, the transfer waits in the endpoint's queue.
    ///
    /// # Safety
    ///
    /// Unless `data` is null, it must be valid for writes of `len` bytes
    /// until the stack learns that the reception completed, or until it
    /// aborts the endpoint.
    pub unsafe fn rx_start(
        &mut self,
        endpoint: EndpointAddress,
        data: *mut u8,
        len: usize,
    ) -> Result<usize, StackError> {
        if len != 0 && data.is_null() {
            return Err(StackError::InvalidArgument);
        }
        let idle = self
            .urb(endpoint)
            .ok_or(StackError::EndpointInvalidAddress)?
            .is_queue_empty();
        let free = endpoint.number() == 0 || (idle && self.controller.urb_free(endpoint));
        if free {
            self.submit(endpoint, Direction::Rx, data, len)?;
        } else {
            self.enqueue(endpoint, data, len)?;
        }
        Ok(len)
    }

    /// Collect a completed reception.
    ///
    /// Returns the number of bytes received, then starts the next queued
    /// reception.
    pub fn rx(&mut self, endpoint: EndpointAddress) -> Result<usize, StackError> {
        let received = self
            .urb(endpoint)
            .ok_or(StackError::EndpointInvalidAddress)?
            .urb
            .processed;
        self.dequeue(endpoint, Direction::Rx);
        Ok(received)
    }

    /// The controller acknowledges OUT zero length packets itself.
    pub fn rx_zlp(&mut self, _endpoint: EndpointAddress) -> Result<(), StackError> {
        Ok(())
    }

    /// Prepare a transmission. The whole buffer goes out in one transfer.
    pub fn tx(
        &mut self,
        _endpoint: EndpointAddress,
        _data: *const u8,
        len: usize,
    ) -> Result<usize, StackError> {
        if len < u32::MAX as usize {
            Ok(len)
        } else {
            Err(StackError::Fail)
        }
    }

    /// Start transmitting `data`.
    ///
    /// With the `usb-queue` feature, a busy endpoint queues the
    /// transmission.
    ///
    /// # Safety
    ///
    /// Unless `data` is null, it must be valid for reads of `len` bytes
    /// until the stack learns that the transmission completed, or until it
    /// aborts the endpoint.
    pub unsafe fn tx_start(
        &mut self,
        endpoint: EndpointAddress,
        data: *const u8,
        len: usize,
    ) -> Result<(), StackError> {
        if len != 0 && data.is_null() {
            return Err(StackError::InvalidArgument);
        }
        let data = data.cast_mut();
        let idle = self
            .urb(endpoint)
            .ok_or(StackError::EndpointInvalidAddress)?
            .is_queue_empty();
        let free = !cfg!(feature = "usb-queue") || (idle && self.controller.urb_free(endpoint));
        if free {
            self.submit(endpoint, Direction::Tx, data, len)
        } else {
            self.enqueue(endpoint, data, len)
        }
    }

    /// Send a zero length packet.
    pub fn tx_zlp(&mut self, endpoint: EndpointAddress) -> Result<(), StackError> {
        self.submit(endpoint, Direction::Tx, core::ptr::null_mut(), 0)
    }

    /// Cancel the endpoint's transfers, including queued ones.
    ///
    /// Returns `false` for an endpoint past [`MAX_ENDPOINT`].
    pub fn abort(&mut self, endpoint: EndpointAddress) -> bool {
        let Some(slot) = self.urb(endpoint) else {
            return false;
        };
        #[cfg(feature = "usb-queue")]
        slot.queue.clear();
        #[cfg(not(feature = "usb-queue"))]
        let _ = slot;
        if self.controller.ep_abort(endpoint).into_result().is_err() {
            warn!("USB endpoint {} abort failed", endpoint.0);
        }
        true
    }

    pub fn stall(&mut self, endpoint: EndpointAddress, stall: bool) -> bool {
        if self.controller.ep_stall(endpoint, stall).into_result().is_err() {
            warn!("USB endpoint {} stall failed", endpoint.0);
        }
        true
    }

    /// Service the USB interrupt.
    ///
    /// Forwards every pending controller notification to the stack.
    pub fn isr(&mut self) {
        while let Some(notification) = self.controller.poll() {
            self.on_notification(notification);
        }
    }

    /// Forward one controller notification to the stack.
    pub fn on_notification(&mut self, notification: Notification) {
        match notification {
            Notification::Bus(event) => self.on_bus_event(event),
            Notification::Setup(packet) => self.core.setup(&packet),
            Notification::Urb {
                endpoint,
                direction,
                status,
                processed,
            } => self.on_urb(endpoint, direction, status, processed),
        }
    }

    fn on_bus_event(&mut self, event: BusEvent) {
        trace!("USB bus event {}", event as u8);
        match event {
            BusEvent::Connect => self.core.connect(),
            BusEvent::Disconnect => self.core.disconnect(),
            BusEvent::Suspend => self.core.suspend(),
            BusEvent::Resume => self.core.resume(),
            BusEvent::Reset => self.core.reset(),
            BusEvent::HighSpeed => self.core.high_speed(),
        }
    }

    fn on_urb(
        &mut self,
        endpoint: EndpointAddress,
        direction: Direction,
        status: Status,
        processed: usize,
    ) {
        if status != Status::UrbComplete {
            warn!(
                "USB endpoint {} unexpected URB status {}",
                endpoint.0,
                status as u8
            );
            return;
        }
        let Some(slot) = self.urb(endpoint) else {
            warn!("USB notification for unknown endpoint {}", endpoint.0);
            return;
        };
        slot.urb.processed = processed;
        match direction {
            Direction::Rx => self.core.rx_complete(endpoint),
            Direction::Tx => {
                self.core.tx_complete(endpoint);
                if endpoint.number() != 0 {
                    self.dequeue(endpoint, Direction::Tx);
                }
            }
        }
    }
}
