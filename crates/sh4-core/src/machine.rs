//! The device aggregate: owns and wires every component of one console.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{info, warn};

use crate::api::MachineConfig;
use crate::cpu::Sh4;
use crate::diag::{DiagProvider, Sh4Diagnostics};
use crate::fault::EmulatorError;
use crate::jit::CodeCache;
use crate::memory::{
    AddressSpace, CodeWriteObserver, RegionDescriptor, SharedMmio, AUDIO_RAM_BASE,
    AUDIO_RAM_SIZE, BOOT_ROM_BASE, BOOT_ROM_SIZE, CCN_BASE, FLASH_BASE, FLASH_SIZE, INTC_BASE,
    SYSTEM_RAM_BASE, SYSTEM_RAM_MIRRORS, TMU_BASE, VIDEO_RAM_ALIAS_BASE, VIDEO_RAM_BASE,
    VIDEO_RAM_SIZE,
};
use crate::peripherals::{
    Ccn, Intc, InterruptSource, Tmu, CCN_BLOCK_SIZE, INTC_BLOCK_SIZE, TMU_BLOCK_SIZE,
};
use crate::render::RenderBackend;
use crate::scheduler::{ScheduledDevice, Scheduler, TimerAction};
use crate::state::Sh4Context;
use crate::trap::{HostTrapLayer, SharedTrapLayer, SoftwarePlatform, TrapPlatform};

type SharedRender = Rc<RefCell<Option<Box<dyn RenderBackend>>>>;

/// Everything a live machine owns, in creation order.
struct Parts {
    trap: SharedTrapLayer,
    intc: Rc<RefCell<Intc>>,
    ccn: Rc<RefCell<Ccn>>,
    tmu: Rc<RefCell<Tmu>>,
    space: AddressSpace,
    cache: Rc<RefCell<CodeCache>>,
    cpu: Rc<RefCell<Sh4>>,
    scheduler: Scheduler,
    render: SharedRender,
}

/// One emulated console.
pub struct Dreamcast {
    config: MachineConfig,
    parts: Option<Parts>,
    failed: Option<EmulatorError>,
}

impl fmt::Debug for Dreamcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dreamcast")
            .field("live", &self.parts.is_some())
            .field("failed", &self.failed)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn destroyed() -> EmulatorError {
    EmulatorError::Configuration("machine has been destroyed".into())
}

fn build_space(
    config: &MachineConfig,
    trap: SharedTrapLayer,
    ccn: SharedMmio,
    intc: SharedMmio,
    tmu: SharedMmio,
) -> Result<AddressSpace, EmulatorError> {
    let mut space = AddressSpace::new(trap);
    space.add_region(RegionDescriptor::rom("boot rom", BOOT_ROM_BASE, BOOT_ROM_SIZE))?;
    space.add_region(RegionDescriptor::ram("flash", FLASH_BASE, FLASH_SIZE))?;
    space.add_region(RegionDescriptor::ram("audio ram", AUDIO_RAM_BASE, AUDIO_RAM_SIZE))?;
    let vram = space.add_region(RegionDescriptor::ram("video ram", VIDEO_RAM_BASE, VIDEO_RAM_SIZE))?;
    space.add_region(RegionDescriptor::alias(
        "video ram 64-bit path",
        VIDEO_RAM_ALIAS_BASE,
        VIDEO_RAM_SIZE,
        vram,
        0,
    ))?;
    let ram = space.add_region(RegionDescriptor::ram(
        "system ram",
        SYSTEM_RAM_BASE,
        config.ram_size,
    ))?;
    for base in SYSTEM_RAM_MIRRORS {
        space.add_region(RegionDescriptor::alias(
            "system ram mirror",
            base,
            config.ram_size,
            ram,
            0,
        ))?;
    }
    space.add_region(RegionDescriptor::mmio("ccn", CCN_BASE, CCN_BLOCK_SIZE, ccn))?;
    space.add_region(RegionDescriptor::mmio("intc", INTC_BASE, INTC_BLOCK_SIZE, intc))?;
    space.add_region(RegionDescriptor::mmio("tmu", TMU_BASE, TMU_BLOCK_SIZE, tmu))?;
    Ok(space)
}

impl Dreamcast {
    /// Builds a machine on the portable software trap platform.
    ///
    /// # Errors
    ///
    /// See [`Dreamcast::create_with_platform`].
    pub fn create(config: MachineConfig) -> Result<Self, EmulatorError> {
        Self::create_with_platform(config, Box::new(SoftwarePlatform))
    }

    /// Builds a machine whose trap layer hooks into `platform`.
    ///
    /// # Errors
    ///
    /// - [`EmulatorError::Configuration`] for an invalid config.
    /// - [`EmulatorError::Install`] when the trap hook cannot be set.
    pub fn create_with_platform(
        config: MachineConfig,
        platform: Box<dyn TrapPlatform>,
    ) -> Result<Self, EmulatorError> {
        config.validate()?;

        let trap = HostTrapLayer::shared(platform);
        trap.borrow_mut().install()?;

        let intc = Rc::new(RefCell::new(Intc::new()));
        let ccn = Rc::new(RefCell::new(Ccn::new()));
        let tmu = Rc::new(RefCell::new(Tmu::new(Rc::clone(&intc))));

        let ccn_mmio: SharedMmio = ccn.clone();
        let intc_mmio: SharedMmio = intc.clone();
        let tmu_mmio: SharedMmio = tmu.clone();
        let mut space = match build_space(&config, Rc::clone(&trap), ccn_mmio, intc_mmio, tmu_mmio)
        {
            Ok(space) => space,
            Err(err) => {
                trap.borrow_mut().uninstall();
                return Err(err);
            }
        };

        let cache = Rc::new(RefCell::new(CodeCache::new(
            config.code_cache_blocks,
            config.max_block_instructions,
        )));
        let observer = Rc::downgrade(&cache);
        let observer: Weak<RefCell<dyn CodeWriteObserver>> = observer;
        space.set_code_observer(observer);
        ccn.borrow_mut().attach_code_cache(Rc::downgrade(&cache));

        let mut cpu = match Sh4::new(&config, Rc::clone(&trap), Rc::clone(&cache)) {
            Ok(cpu) => cpu,
            Err(err) => {
                trap.borrow_mut().uninstall();
                return Err(err);
            }
        };
        cpu.connect(Rc::clone(&intc), Rc::clone(&ccn));
        let cpu = Rc::new(RefCell::new(cpu));

        let render: SharedRender = Rc::new(RefCell::new(None));
        let mut scheduler = Scheduler::new(config.slice_cycles);
        let cpu_device = Rc::downgrade(&cpu);
        let cpu_device: Weak<RefCell<dyn ScheduledDevice>> = cpu_device;
        let tmu_device = Rc::downgrade(&tmu);
        let tmu_device: Weak<RefCell<dyn ScheduledDevice>> = tmu_device;
        scheduler.add_device(cpu_device);
        scheduler.add_device(tmu_device);
        if let Some(period) = config.vblank_period() {
            let intc = Rc::clone(&intc);
            let render = Rc::clone(&render);
            scheduler.start_timer(
                period,
                Box::new(move || {
                    intc.borrow_mut().raise(InterruptSource::Irl13);
                    if let Some(backend) = render.borrow_mut().as_mut() {
                        backend.begin_frame();
                        backend.end_frame();
                    }
                    TimerAction::Reschedule(period)
                }),
            );
        }

        info!(
            mode = ?config.execution_mode,
            fastmem = config.fastmem,
            ram_size = config.ram_size,
            regions = space.region_count(),
            "machine created"
        );
        Ok(Self {
            config,
            parts: Some(Parts {
                trap,
                intc,
                ccn,
                tmu,
                space,
                cache,
                cpu,
                scheduler,
                render,
            }),
            failed: None,
        })
    }

    /// Tears the machine down in reverse creation order. Calling it again
    /// does nothing.
    pub fn destroy(&mut self) {
        let Some(parts) = self.parts.take() else {
            return;
        };
        let Parts {
            trap,
            intc,
            ccn,
            tmu,
            space,
            cache,
            cpu,
            scheduler,
            render,
        } = parts;
        drop(scheduler);
        drop(render);
        drop(cpu);
        drop(cache);
        drop(space);
        drop(tmu);
        drop(ccn);
        drop(intc);
        trap.borrow_mut().uninstall();
        info!("machine destroyed");
    }

    /// Returns true until [`Dreamcast::destroy`] runs.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.parts.is_some()
    }

    /// Configuration the machine was built with.
    #[must_use]
    pub const fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// The error that stopped the machine, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&EmulatorError> {
        self.failed.as_ref()
    }

    /// Parts of a machine that has not been destroyed. A stopped machine
    /// stays inspectable.
    fn parts(&self) -> Result<&Parts, EmulatorError> {
        self.parts.as_ref().ok_or_else(destroyed)
    }

    fn live_mut(&mut self) -> Result<&mut Parts, EmulatorError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        self.parts.as_mut().ok_or_else(destroyed)
    }

    fn latch<T>(&mut self, result: Result<T, EmulatorError>) -> Result<T, EmulatorError> {
        if let Err(err) = &result {
            if err.is_terminal() {
                warn!(%err, "machine stopped");
                self.failed = Some(err.clone());
            }
        }
        result
    }

    /// Advances every device by `cycles` on the shared clock.
    ///
    /// # Errors
    ///
    /// The first terminal error; the machine refuses to run afterwards and
    /// keeps returning it.
    pub fn run(&mut self, cycles: u64) -> Result<u64, EmulatorError> {
        let result = self.live_mut().and_then(|parts| {
            let Parts {
                scheduler, space, ..
            } = parts;
            scheduler.run(space, cycles)
        });
        self.latch(result)
    }

    /// Runs the CPU alone for `cycles`, leaving the scheduler clock and the
    /// other devices untouched.
    ///
    /// # Errors
    ///
    /// See [`Dreamcast::run`].
    pub fn run_cpu(&mut self, cycles: u64) -> Result<u64, EmulatorError> {
        let result = self.live_mut().and_then(|parts| {
            let Parts { cpu, space, .. } = parts;
            cpu.borrow_mut().run(space, cycles)
        });
        self.latch(result)
    }

    /// Register context. Still readable after the machine has stopped, so
    /// the faulting state can be inspected.
    ///
    /// # Errors
    ///
    /// Fails once the machine is destroyed.
    pub fn context(&self) -> Result<Ref<'_, Sh4Context>, EmulatorError> {
        Ok(Ref::map(self.parts()?.cpu.borrow(), Sh4::context))
    }

    /// Mutable register context.
    ///
    /// # Errors
    ///
    /// Fails once the machine is destroyed or stopped.
    pub fn context_mut(&mut self) -> Result<RefMut<'_, Sh4Context>, EmulatorError> {
        Ok(RefMut::map(self.live_mut()?.cpu.borrow_mut(), Sh4::context_mut))
    }

    /// Guest address space, readable after the machine has stopped.
    ///
    /// # Errors
    ///
    /// Fails once the machine is destroyed.
    pub fn space(&self) -> Result<&AddressSpace, EmulatorError> {
        Ok(&self.parts()?.space)
    }

    /// Mutable guest address space.
    ///
    /// # Errors
    ///
    /// Fails once the machine is destroyed or stopped.
    pub fn space_mut(&mut self) -> Result<&mut AddressSpace, EmulatorError> {
        Ok(&mut self.live_mut()?.space)
    }

    /// The CPU core, for harnesses that need more than the context.
    ///
    /// # Errors
    ///
    /// Fails once the machine is destroyed.
    pub fn cpu(&self) -> Result<Rc<RefCell<Sh4>>, EmulatorError> {
        Ok(Rc::clone(&self.parts()?.cpu))
    }

    /// Interrupt controller.
    ///
    /// # Errors
    ///
    /// Fails once the machine is destroyed.
    pub fn intc(&self) -> Result<Rc<RefCell<Intc>>, EmulatorError> {
        Ok(Rc::clone(&self.parts()?.intc))
    }

    /// Redirects the CPU to `addr`.
    ///
    /// # Errors
    ///
    /// Fails once the machine is destroyed or stopped.
    pub fn set_pc(&mut self, addr: u32) -> Result<(), EmulatorError> {
        self.live_mut()?.cpu.borrow_mut().set_pc(addr);
        Ok(())
    }

    /// Copies `bytes` into guest memory at `addr` through the checked path.
    ///
    /// # Errors
    ///
    /// [`EmulatorError::Configuration`] when the copy is misaligned or hits
    /// memory that does not accept it.
    pub fn memcpy_to_guest(&mut self, addr: u32, bytes: &[u8]) -> Result<(), EmulatorError> {
        self.live_mut()?
            .space
            .memcpy_to_guest(addr, bytes)
            .map_err(|fault| EmulatorError::Configuration(format!("guest copy failed: {fault}")))
    }

    /// Installs the sink that receives frame boundaries at every vblank.
    ///
    /// # Errors
    ///
    /// Fails once the machine is destroyed or stopped.
    pub fn attach_render_backend(
        &mut self,
        backend: Box<dyn RenderBackend>,
    ) -> Result<(), EmulatorError> {
        *self.live_mut()?.render.borrow_mut() = Some(backend);
        Ok(())
    }

    /// Removes and returns the attached render sink.
    pub fn detach_render_backend(&mut self) -> Option<Box<dyn RenderBackend>> {
        self.parts
            .as_mut()
            .and_then(|parts| parts.render.borrow_mut().take())
    }

    /// Shared clock position in cycles.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.parts.as_ref().map_or(0, |parts| parts.scheduler.now())
    }
}

impl DiagProvider for Dreamcast {
    fn diagnostics(&self) -> Sh4Diagnostics {
        self.parts
            .as_ref()
            .and_then(|parts| parts.cpu.try_borrow().ok().map(|cpu| cpu.diagnostics()))
            .unwrap_or_default()
    }
}

impl Drop for Dreamcast {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ExecutionMode;
    use crate::render::{Surface, Surface2D, TextureDesc, TextureHandle, Vertex, Vertex2D};
    use crate::trap::TrapPlatform;
    use std::cell::Cell;

    const BASE: u32 = 0x8c01_0000;

    fn small() -> MachineConfig {
        MachineConfig {
            ram_size: 0x10_0000,
            ..MachineConfig::default()
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MachineConfig {
            slice_cycles: 0,
            ..MachineConfig::default()
        };
        assert!(matches!(
            Dreamcast::create(config),
            Err(EmulatorError::Configuration(_))
        ));
    }

    #[test]
    fn ram_is_reachable_through_every_mirror() {
        let mut dc = Dreamcast::create(small()).unwrap();
        dc.space_mut().unwrap().write_u32(0x8c00_0010, 0x1234_5678).unwrap();
        let space = dc.space().unwrap();
        for addr in [0x0c00_0010, 0xac00_0010, 0x0d00_0010, 0x8f00_0010] {
            assert_eq!(space.read_u32(addr).unwrap(), 0x1234_5678, "{addr:#x}");
        }
    }

    #[test]
    fn peripherals_are_mapped_in_p4() {
        let mut dc = Dreamcast::create(small()).unwrap();
        let space = dc.space_mut().unwrap();
        space.write_u16(0xffd0_0004, 0xf000).unwrap();
        assert_eq!(space.read_u16(0x1fd0_0004).unwrap(), 0xf000);
    }

    #[test]
    fn boot_rom_is_read_only() {
        let mut dc = Dreamcast::create(small()).unwrap();
        assert!(dc.space_mut().unwrap().write_u32(0xa000_0000, 0).is_err());
    }

    #[test]
    fn runs_guest_code_until_return() {
        let mut dc = Dreamcast::create(small()).unwrap();
        // add #1,r0; rts; nop; nop (padding)
        let code: Vec<u8> = [0x7001u16, 0x000b, 0x0009, 0x0009]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect();
        dc.memcpy_to_guest(BASE, &code).unwrap();
        dc.context_mut().unwrap().set_r(0, 5);
        dc.context_mut().unwrap().pr = 0;
        dc.set_pc(BASE).unwrap();
        while dc.context().unwrap().pc != 0 {
            dc.run_cpu(1).unwrap();
        }
        assert_eq!(dc.context().unwrap().r(0), 6);
        assert_eq!(dc.diagnostics().instructions, 3);
    }

    /// Counts presented frames into a shared cell.
    struct FrameCounter(Rc<Cell<i32>>);

    impl RenderBackend for FrameCounter {
        fn create_texture(&mut self, _: &TextureDesc, _: &[u8]) -> TextureHandle {
            TextureHandle::default()
        }
        fn destroy_texture(&mut self, _: TextureHandle) {}
        fn begin_frame(&mut self) {}
        fn end_frame(&mut self) {
            self.0.set(self.0.get() + 1);
        }
        fn begin_surfaces(&mut self, _: &[f32; 16], _: &[Vertex]) {}
        fn draw_surface(&mut self, _: &Surface) {}
        fn end_surfaces(&mut self) {}
        fn begin_ortho(&mut self) {}
        fn draw_ortho(&mut self, _: &[Vertex2D], _: &Surface2D) {}
        fn end_ortho(&mut self) {}
    }

    #[test]
    fn vblank_raises_irl13_and_presents_frames() {
        let config = MachineConfig {
            execution_mode: ExecutionMode::Interpreter,
            cpu_clock_hz: 6000,
            vblank_hz: Some(60),
            ..small()
        };
        let mut dc = Dreamcast::create(config).unwrap();
        // bra .; nop
        dc.memcpy_to_guest(BASE, &[0xfe, 0xaf, 0x09, 0x00]).unwrap();
        dc.set_pc(BASE).unwrap();
        let frames = Rc::new(Cell::new(0));
        dc.attach_render_backend(Box::new(FrameCounter(Rc::clone(&frames))))
            .unwrap();

        // 100-cycle frames; SR.BL is still set from reset, so the request
        // stays pending.
        assert_eq!(dc.run(350).unwrap(), 350);
        assert_eq!(frames.get(), 3);
        assert!(dc.intc().unwrap().borrow().is_pending(InterruptSource::Irl13));
        assert!(dc.detach_render_backend().is_some());
        dc.run(100).unwrap();
        assert_eq!(frames.get(), 3);
    }

    #[test]
    fn unclaimed_trap_latches_failure() {
        let mut dc = Dreamcast::create(small()).unwrap();
        // mov.l @r1,r0 against unmapped memory with the hook removed.
        dc.memcpy_to_guest(BASE, &[0x12, 0x60, 0x09, 0x00]).unwrap();
        dc.context_mut().unwrap().set_r(1, 0x8200_0000);
        dc.set_pc(BASE).unwrap();
        dc.space().unwrap().trap_layer().borrow_mut().uninstall();

        let err = dc.run_cpu(10).unwrap_err();
        assert!(matches!(err, EmulatorError::HostFault(_)));
        assert!(dc.failure().is_some());
        assert_eq!(dc.run(10).unwrap_err(), err);
        assert_eq!(dc.set_pc(BASE).unwrap_err(), err);
        assert!(dc.context_mut().is_err());
    }

    #[test]
    fn stopped_machine_stays_inspectable() {
        let mut dc = Dreamcast::create(small()).unwrap();
        // mov.l @r1,r0 against unmapped memory with the hook removed.
        dc.memcpy_to_guest(BASE, &[0x12, 0x60, 0x09, 0x00]).unwrap();
        dc.context_mut().unwrap().set_r(1, 0x8200_0000);
        dc.set_pc(BASE).unwrap();
        dc.space().unwrap().trap_layer().borrow_mut().uninstall();
        assert!(dc.run_cpu(10).is_err());

        let ctx = dc.context().unwrap();
        assert_eq!(ctx.r(1), 0x8200_0000);
        drop(ctx);
        assert_eq!(dc.space().unwrap().read_u16(BASE).unwrap(), 0x6012);
        assert!(dc.cpu().is_ok());
        assert!(dc.intc().is_ok());

        dc.destroy();
        assert!(matches!(dc.context(), Err(EmulatorError::Configuration(_))));
    }

    struct Tracked(Rc<Cell<i32>>);

    impl TrapPlatform for Tracked {
        fn hook(&mut self) -> Result<(), String> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }

        fn unhook(&mut self) {
            self.0.set(self.0.get() - 1);
        }

        fn name(&self) -> &'static str {
            "tracked"
        }
    }

    #[test]
    fn destroy_is_idempotent_and_unhooks() {
        let hooks = Rc::new(Cell::new(0));
        let mut dc =
            Dreamcast::create_with_platform(small(), Box::new(Tracked(Rc::clone(&hooks)))).unwrap();
        assert_eq!(hooks.get(), 1);
        dc.destroy();
        assert_eq!(hooks.get(), 0);
        dc.destroy();
        drop(dc);
        assert_eq!(hooks.get(), 0);
    }

    #[test]
    fn destroyed_machine_refuses_to_run() {
        let mut dc = Dreamcast::create(small()).unwrap();
        dc.destroy();
        assert!(!dc.is_live());
        assert!(matches!(dc.run(1), Err(EmulatorError::Configuration(_))));
    }

    #[test]
    fn machines_coexist() {
        let mut a = Dreamcast::create(small()).unwrap();
        let b = Dreamcast::create(small()).unwrap();
        a.space_mut().unwrap().write_u32(0x8c00_0000, 7).unwrap();
        assert_eq!(b.space().unwrap().read_u32(0x8c00_0000).unwrap(), 0);
    }
}
