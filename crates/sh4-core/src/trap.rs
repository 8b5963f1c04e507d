//! Host trap layer.
//!
//! A fixed-capacity registry of listeners consulted whenever the fast memory
//! path cannot complete an access on its own. Listeners are kept in
//! intrusive per-priority lists threaded through a statically sized slot
//! array, so registration and removal are O(1) and dispatch never allocates.
//!
//! The registry is owned by one machine and shared by reference; there is no
//! process-wide instance.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, info};

use crate::fault::EmulatorError;
use crate::memory::AccessWidth;

/// Maximum number of concurrently registered listeners.
pub const TRAP_LISTENER_CAPACITY: usize = 32;

const PRIORITY_COUNT: usize = 3;

/// Shared handle to a machine's trap layer.
pub type SharedTrapLayer = Rc<RefCell<HostTrapLayer>>;

/// Direction of the faulting access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// Load.
    Read,
    /// Store.
    Write,
}

/// Why the fast path could not complete the access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapCause {
    /// The page has no directly addressable host memory behind it.
    Unbacked,
    /// The page holds translated code and is write-protected.
    WriteProtected,
    /// The address is not a multiple of the access width.
    Misaligned,
}

/// Machine state captured at the faulting access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapturedState {
    /// Address of the faulting instruction.
    pub pc: u32,
    /// Status register at the fault.
    pub sr: u32,
    /// General registers at the fault.
    pub r: [u32; 16],
}

/// Description of one trap, passed to listeners by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRecord {
    /// Guest address of the faulting access.
    pub fault_addr: u32,
    /// Load or store.
    pub access: AccessKind,
    /// Access width.
    pub width: AccessWidth,
    /// Reason the fast path trapped.
    pub cause: TrapCause,
    /// Captured machine state.
    pub state: CapturedState,
}

/// Callback consulted on every trap.
///
/// Implementations run on the faulting path and must not allocate, block or
/// touch the guest address space.
pub trait TrapListener {
    /// Returns true to claim the fault and resume execution.
    fn on_trap(&mut self, record: &ExceptionRecord) -> bool;
}

impl<F> TrapListener for F
where
    F: FnMut(&ExceptionRecord) -> bool,
{
    fn on_trap(&mut self, record: &ExceptionRecord) -> bool {
        self(record)
    }
}

/// Dispatch priority class. Within a class, registration order applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrapPriority {
    /// Consulted first.
    High = 0,
    /// Default class.
    Normal = 1,
    /// Consulted last.
    Low = 2,
}

/// Generational handle returned by [`HostTrapLayer::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrapHandle {
    index: u8,
    generation: u32,
}

/// Platform hook the trap layer installs itself into.
pub trait TrapPlatform {
    /// Installs the process hook.
    ///
    /// # Errors
    ///
    /// Returns a description of why the hook could not be set.
    fn hook(&mut self) -> Result<(), String>;

    /// Reverts the process hook.
    fn unhook(&mut self);

    /// Short platform name for logs.
    fn name(&self) -> &'static str;
}

/// Platform whose traps are raised by the guest memory fast path itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwarePlatform;

impl TrapPlatform for SoftwarePlatform {
    fn hook(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn unhook(&mut self) {}

    fn name(&self) -> &'static str {
        "software"
    }
}

struct Slot {
    listener: Option<Box<dyn TrapListener>>,
    generation: u32,
    priority: TrapPriority,
    prev: Option<u8>,
    next: Option<u8>,
}

impl Slot {
    const fn empty() -> Self {
        Self {
            listener: None,
            generation: 0,
            priority: TrapPriority::Normal,
            prev: None,
            next: None,
        }
    }
}

/// Fixed-capacity trap listener registry.
pub struct HostTrapLayer {
    slots: [Slot; TRAP_LISTENER_CAPACITY],
    free_head: Option<u8>,
    heads: [Option<u8>; PRIORITY_COUNT],
    tails: [Option<u8>; PRIORITY_COUNT],
    live: usize,
    installed: bool,
    dispatched: u64,
    platform: Box<dyn TrapPlatform>,
}

impl fmt::Debug for HostTrapLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostTrapLayer")
            .field("platform", &self.platform.name())
            .field("installed", &self.installed)
            .field("live", &self.live)
            .field("dispatched", &self.dispatched)
            .finish()
    }
}

impl Default for HostTrapLayer {
    fn default() -> Self {
        Self::new(Box::new(SoftwarePlatform))
    }
}

impl HostTrapLayer {
    /// Creates an uninstalled registry bound to `platform`.
    #[must_use]
    pub fn new(platform: Box<dyn TrapPlatform>) -> Self {
        let mut slots: [Slot; TRAP_LISTENER_CAPACITY] = std::array::from_fn(|_| Slot::empty());
        for (index, slot) in slots.iter_mut().enumerate() {
            slot.next = u8::try_from(index + 1)
                .ok()
                .filter(|&next| usize::from(next) < TRAP_LISTENER_CAPACITY);
        }

        Self {
            slots,
            free_head: Some(0),
            heads: [None; PRIORITY_COUNT],
            tails: [None; PRIORITY_COUNT],
            live: 0,
            installed: false,
            dispatched: 0,
            platform,
        }
    }

    /// Creates a registry wrapped for sharing between components.
    #[must_use]
    pub fn shared(platform: Box<dyn TrapPlatform>) -> SharedTrapLayer {
        Rc::new(RefCell::new(Self::new(platform)))
    }

    /// Installs the platform hook. Installing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::Install`] if the platform refuses the hook.
    pub fn install(&mut self) -> Result<(), EmulatorError> {
        if self.installed {
            return Ok(());
        }
        self.platform.hook().map_err(EmulatorError::Install)?;
        self.installed = true;
        info!(platform = self.platform.name(), "trap handler installed");
        Ok(())
    }

    /// Reverts the platform hook. Idempotent.
    pub fn uninstall(&mut self) {
        if !self.installed {
            return;
        }
        self.platform.unhook();
        self.installed = false;
        info!(platform = self.platform.name(), "trap handler uninstalled");
    }

    /// Returns true while the platform hook is installed.
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.installed
    }

    /// Number of registered listeners.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no listener is registered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Total traps dispatched since creation.
    #[must_use]
    pub const fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Registers a listener at the tail of its priority class.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::Configuration`] when all
    /// [`TRAP_LISTENER_CAPACITY`] slots are taken.
    pub fn add(
        &mut self,
        priority: TrapPriority,
        listener: Box<dyn TrapListener>,
    ) -> Result<TrapHandle, EmulatorError> {
        let Some(index) = self.free_head else {
            return Err(EmulatorError::Configuration(format!(
                "trap listener capacity of {TRAP_LISTENER_CAPACITY} exceeded"
            )));
        };
        let class = priority as usize;
        let tail = self.tails[class];

        let slot = &mut self.slots[usize::from(index)];
        self.free_head = slot.next;
        slot.listener = Some(listener);
        slot.priority = priority;
        slot.prev = tail;
        slot.next = None;
        let generation = slot.generation;

        match tail {
            Some(tail) => self.slots[usize::from(tail)].next = Some(index),
            None => self.heads[class] = Some(index),
        }
        self.tails[class] = Some(index);
        self.live += 1;

        debug!(index, ?priority, "trap listener added");
        Ok(TrapHandle { index, generation })
    }

    /// Deregisters a listener. Returns false for stale or foreign handles.
    pub fn remove(&mut self, handle: TrapHandle) -> bool {
        let Some(slot) = self.slots.get_mut(usize::from(handle.index)) else {
            return false;
        };
        if slot.listener.is_none() || slot.generation != handle.generation {
            return false;
        }

        slot.listener = None;
        slot.generation = slot.generation.wrapping_add(1);
        let (prev, next, class) = (slot.prev, slot.next, slot.priority as usize);

        match prev {
            Some(prev) => self.slots[usize::from(prev)].next = next,
            None => self.heads[class] = next,
        }
        match next {
            Some(next) => self.slots[usize::from(next)].prev = prev,
            None => self.tails[class] = prev,
        }

        let slot = &mut self.slots[usize::from(handle.index)];
        slot.prev = None;
        slot.next = self.free_head;
        self.free_head = Some(handle.index);
        self.live -= 1;

        debug!(index = handle.index, "trap listener removed");
        true
    }

    /// Offers `record` to listeners in priority then registration order.
    ///
    /// Returns true as soon as one claims it, false if none does or the
    /// layer is not installed.
    pub fn dispatch(&mut self, record: &ExceptionRecord) -> bool {
        if !self.installed {
            return false;
        }
        self.dispatched = self.dispatched.saturating_add(1);

        for class in 0..PRIORITY_COUNT {
            let mut cursor = self.heads[class];
            while let Some(index) = cursor {
                let slot = &mut self.slots[usize::from(index)];
                cursor = slot.next;
                if let Some(listener) = slot.listener.as_mut() {
                    if listener.on_trap(record) {
                        return true;
                    }
                }
            }
        }
        false
    }
}
