//! In-memory board.
//!
//! Every device appends to one shared journal so tests can check the order
//! of a whole transition. Storage and settings keep a staged view and a
//! durable view; [`SimBoard::power_loss`] throws the staged view away.
//!
//! Paths that never return on hardware (reset, standby, a successful jump,
//! a scripted power cut) unwind with a [`Halt`] payload; [`expect_halt`]
//! catches it.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::boot::{BootMagic, ImageHandoff, MagicStore, VectorTable};
use crate::config::FramebufferLayout;
use crate::error::{Error, Result};
use crate::hal::storage::write_all;
use crate::hal::{
    Audio, Display, FileStat, FlashAlloc, Peripherals, Platform, Settings, Storage, System, Ui,
    WakePin,
};
use crate::app::StateHandlers;

/// Why simulated execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    Reset,
    Standby,
    Jumped(VectorTable),
    PowerLoss,
}

/// Everything the board observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    WakeSourceArmed(WakePin),
    WakeFlagCleared,
    StopModeEntered,
    StandbyEntered,
    ClocksRestored(u8),
    TickResumed,
    PowerButtonDebounced,
    SystemDeinit,
    Reset,
    DisplayInit,
    DisplayDeinit,
    DisplayReinit,
    Swap,
    Vblank,
    BacklightOff,
    Backlight(u8),
    AudioInit(u32),
    AudioStart,
    AudioStop,
    Speaker(bool),
    Mounted,
    Unmounted,
    Mkdir(String),
    FileWritten(String),
    StorageCommit,
    SettingsCommit,
    SettingsReset,
    FlashAllocReset,
    SleepLogo,
    StorageErrorScreen,
    MagicWritten(BootMagic),
    BackupWritten(BootMagic),
    MpuDisabled,
    CachesInvalidated,
    WordWritten(u32, u32),
    Jumped(VectorTable),
    Hook(&'static str),
}

#[derive(Default)]
struct Journal {
    events: Vec<SimEvent>,
    cut_after: Option<SimEvent>,
}

/// Shared, append-only event log.
#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Journal>>);

impl EventLog {
    /// Append an event, cutting power if it was the scripted trigger
    pub fn record(&self, event: SimEvent) {
        let cut = {
            let mut journal = self.0.borrow_mut();
            let cut = journal.cut_after.as_ref() == Some(&event);
            journal.events.push(event);
            cut
        };
        if cut {
            halt(Halt::PowerLoss);
        }
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.0.borrow().events.clone()
    }

    pub fn position(&self, event: &SimEvent) -> Option<usize> {
        self.0.borrow().events.iter().position(|e| e == event)
    }

    pub fn contains(&self, event: &SimEvent) -> bool {
        self.position(event).is_some()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().events.clear();
    }
}

fn halt(reason: Halt) -> ! {
    std::panic::panic_any(reason)
}

/// Run `f` and return the [`Halt`] it stopped with.
///
/// Panics if `f` completes or panics for another reason.
pub fn expect_halt<R>(f: impl FnOnce() -> R) -> Halt {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(_) => panic!("expected the board to halt"),
        Err(payload) => match payload.downcast::<Halt>() {
            Ok(reason) => *reason,
            Err(other) => std::panic::resume_unwind(other),
        },
    }
}

// =============================================================================
// System
// =============================================================================

pub struct SimSystem {
    log: EventLog,
    clock: Rc<Cell<u64>>,
    /// Time that passes while stopped
    pub sleep_duration_ms: u64,
    /// Model a standby entry that falls through
    pub standby_returns: bool,
    pub battery: u8,
    pub watchdog_refreshes: u32,
}

impl SimSystem {
    pub fn advance(&self, ms: u64) {
        self.clock.set(self.clock.get() + ms);
    }
}

impl System for SimSystem {
    fn uptime_ms(&self) -> u64 {
        self.clock.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(ms as u64);
    }

    fn refresh_watchdog(&mut self) {
        self.watchdog_refreshes += 1;
    }

    fn configure_wake_source(&mut self, pin: WakePin) {
        self.log.record(SimEvent::WakeSourceArmed(pin));
    }

    fn clear_wake_flag(&mut self) {
        self.log.record(SimEvent::WakeFlagCleared);
    }

    fn enter_stop_mode(&mut self) {
        self.log.record(SimEvent::StopModeEntered);
        self.advance(self.sleep_duration_ms);
    }

    fn enter_standby_mode(&mut self) {
        self.log.record(SimEvent::StandbyEntered);
        if !self.standby_returns {
            halt(Halt::Standby);
        }
    }

    fn restore_clocks(&mut self, overclock: u8) {
        self.log.record(SimEvent::ClocksRestored(overclock));
    }

    fn resume_tick(&mut self) {
        self.log.record(SimEvent::TickResumed);
    }

    fn debounce_power_button(&mut self) {
        self.log.record(SimEvent::PowerButtonDebounced);
    }

    fn battery_percent(&self) -> u8 {
        self.battery
    }

    fn deinit(&mut self) {
        self.log.record(SimEvent::SystemDeinit);
    }

    fn system_reset(&mut self) {
        self.log.record(SimEvent::Reset);
        halt(Halt::Reset);
    }
}

// =============================================================================
// Display / audio / UI
// =============================================================================

pub struct SimDisplay {
    log: EventLog,
    pub backlight: u8,
    pub configured_brightness: u8,
    pub framebuffer: Vec<u8>,
}

impl Display for SimDisplay {
    fn init(&mut self) {
        self.log.record(SimEvent::DisplayInit);
    }

    fn deinit(&mut self) {
        self.log.record(SimEvent::DisplayDeinit);
    }

    fn reinit(&mut self) {
        self.log.record(SimEvent::DisplayReinit);
    }

    fn swap(&mut self) {
        self.log.record(SimEvent::Swap);
    }

    fn wait_for_vblank(&mut self) {
        self.log.record(SimEvent::Vblank);
    }

    fn inactive_framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    fn backlight_off(&mut self) {
        self.backlight = 0;
        self.log.record(SimEvent::BacklightOff);
    }

    fn backlight_set(&mut self, level: u8) {
        self.backlight = level;
        self.log.record(SimEvent::Backlight(level));
    }

    fn configured_brightness(&self) -> u8 {
        self.configured_brightness
    }
}

pub struct SimAudio {
    log: EventLog,
    pub sample_rate: u32,
    pub playing: bool,
    pub speaker: bool,
}

impl Audio for SimAudio {
    fn init(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.log.record(SimEvent::AudioInit(sample_rate));
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start_playing(&mut self) {
        self.playing = true;
        self.log.record(SimEvent::AudioStart);
    }

    fn stop_playing(&mut self) {
        self.playing = false;
        self.log.record(SimEvent::AudioStop);
    }

    fn set_speaker(&mut self, enabled: bool) {
        self.speaker = enabled;
        self.log.record(SimEvent::Speaker(enabled));
    }
}

pub struct SimUi {
    log: EventLog,
    pub tab: u16,
}

impl Ui for SimUi {
    fn current_tab(&self) -> u16 {
        self.tab
    }

    fn draw_sleep_logo(&mut self) {
        self.log.record(SimEvent::SleepLogo);
    }

    fn storage_error_screen(&mut self) {
        self.log.record(SimEvent::StorageErrorScreen);
    }
}

// =============================================================================
// Storage
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimFile {
    pub data: Vec<u8>,
    pub mtime: u64,
}

pub struct SimStorage {
    log: EventLog,
    clock: Rc<Cell<u64>>,
    mounted: bool,
    files: BTreeMap<String, SimFile>,
    durable: BTreeMap<String, SimFile>,
    dirs: BTreeSet<String>,
    /// Cap on the bytes any single write reaches the card with
    pub short_write_limit: Option<usize>,
    pub fail_mkdir: bool,
    pub fail_mount: bool,
    pub fail_open: BTreeSet<String>,
    pub commits: u32,
}

impl SimStorage {
    /// Place a committed file directly on the card
    pub fn seed(&mut self, path: &str, data: &[u8], mtime: u64) {
        let file = SimFile {
            data: data.to_vec(),
            mtime,
        };
        self.files.insert(path.to_string(), file.clone());
        self.durable.insert(path.to_string(), file);
    }

    /// File as currently visible, committed or not
    pub fn file(&self, path: &str) -> Option<&SimFile> {
        self.files.get(path)
    }

    /// File as it would be after a power cut
    pub fn durable_file(&self, path: &str) -> Option<&SimFile> {
        self.durable.get(path)
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.dirs.contains(path)
    }

    fn power_loss(&mut self) {
        self.files = self.durable.clone();
    }
}

impl Storage for SimStorage {
    fn mount(&mut self) -> Result<()> {
        if self.fail_mount {
            return Err(Error::NotMounted);
        }
        self.mounted = true;
        self.log.record(SimEvent::Mounted);
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = false;
        self.log.record(SimEvent::Unmounted);
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn stat(&self, path: &str) -> FileStat {
        match self.files.get(path) {
            Some(file) if self.mounted => FileStat {
                exists: true,
                mtime: file.mtime,
            },
            _ => FileStat::default(),
        }
    }

    fn read(&mut self, path: &str, buf: &mut [u8]) -> Result<usize> {
        if !self.mounted {
            return Err(Error::NotMounted);
        }
        let file = self.files.get(path).ok_or_else(|| Error::Open {
            path: path.to_string(),
        })?;
        let len = file.data.len().min(buf.len());
        buf[..len].copy_from_slice(&file.data[..len]);
        Ok(len)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<usize> {
        if !self.mounted {
            return Err(Error::NotMounted);
        }
        if self.fail_open.contains(path) {
            return Err(Error::Open {
                path: path.to_string(),
            });
        }
        let len = self.short_write_limit.map_or(data.len(), |cap| cap.min(data.len()));
        let file = SimFile {
            data: data[..len].to_vec(),
            mtime: self.clock.get() / 1000,
        };
        self.files.insert(path.to_string(), file);
        self.log.record(SimEvent::FileWritten(path.to_string()));
        Ok(len)
    }

    fn mkdir(&mut self, path: &str) -> Result<()> {
        if !self.mounted || self.fail_mkdir {
            return Err(Error::Mkdir {
                path: path.to_string(),
            });
        }
        self.dirs.insert(path.to_string());
        self.log.record(SimEvent::Mkdir(path.to_string()));
        Ok(())
    }

    fn commit(&mut self) {
        self.durable = self.files.clone();
        self.commits += 1;
        self.log.record(SimEvent::StorageCommit);
    }
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsValues {
    pub startup_file: Option<String>,
    pub selected_tab: u16,
    pub cpu_overclock: u8,
    pub idle_timeout_s: u32,
}

pub struct SimSettings {
    log: EventLog,
    staged: SettingsValues,
    durable: SettingsValues,
    pub commits: u32,
}

impl SimSettings {
    /// Change both the staged and the persisted copy
    pub fn seed(&mut self, f: impl FnOnce(&mut SettingsValues)) {
        f(&mut self.staged);
        self.durable = self.staged.clone();
    }

    pub fn staged(&self) -> &SettingsValues {
        &self.staged
    }

    pub fn durable(&self) -> &SettingsValues {
        &self.durable
    }
}

impl Settings for SimSettings {
    fn load(&mut self) {
        self.staged = self.durable.clone();
    }

    fn startup_file(&self) -> Option<String> {
        self.staged.startup_file.clone()
    }

    fn set_startup_file(&mut self, path: Option<&str>) {
        self.staged.startup_file = path.map(|p| p.to_string());
    }

    fn selected_tab(&self) -> u16 {
        self.staged.selected_tab
    }

    fn set_selected_tab(&mut self, tab: u16) {
        self.staged.selected_tab = tab;
    }

    fn cpu_overclock(&self) -> u8 {
        self.staged.cpu_overclock
    }

    fn set_cpu_overclock(&mut self, level: u8) {
        self.staged.cpu_overclock = level;
    }

    fn idle_timeout_s(&self) -> u32 {
        self.staged.idle_timeout_s
    }

    fn set_idle_timeout_s(&mut self, seconds: u32) {
        self.staged.idle_timeout_s = seconds;
    }

    fn reset(&mut self) {
        self.staged = SettingsValues::default();
        self.log.record(SimEvent::SettingsReset);
    }

    fn commit(&mut self) {
        self.durable = self.staged.clone();
        self.commits += 1;
        self.log.record(SimEvent::SettingsCommit);
    }
}

// =============================================================================
// External flash store
// =============================================================================

pub struct SimFlashAlloc {
    log: EventLog,
    /// Files currently cached in external flash
    pub cached: BTreeSet<String>,
}

impl FlashAlloc for SimFlashAlloc {
    fn reset(&mut self) {
        self.cached.clear();
        self.log.record(SimEvent::FlashAllocReset);
    }
}

// =============================================================================
// Boot words and handoff
// =============================================================================

pub struct SimMagic {
    log: EventLog,
    value: u32,
    backup_domain: bool,
}

impl MagicStore for SimMagic {
    fn read_raw(&self) -> u32 {
        self.value
    }

    fn write_raw(&mut self, value: u32) {
        self.value = value;
        let magic = BootMagic::from_raw(value);
        if self.backup_domain {
            self.log.record(SimEvent::BackupWritten(magic));
        } else {
            self.log.record(SimEvent::MagicWritten(magic));
        }
    }
}

pub struct SimHandoff {
    log: EventLog,
    images: BTreeMap<u32, VectorTable>,
    words: BTreeMap<u32, u32>,
    /// Model a jump that comes back
    pub jump_returns: bool,
}

impl SimHandoff {
    /// Flash an image whose vector table sits at `base`
    pub fn install_image(&mut self, base: u32, initial_sp: u32, entry: u32) {
        self.images.insert(base, VectorTable { initial_sp, entry });
    }

    pub fn word(&self, addr: u32) -> Option<u32> {
        self.words.get(&addr).copied()
    }
}

impl ImageHandoff for SimHandoff {
    fn read_vector_table(&self, base: u32) -> VectorTable {
        // Erased flash reads back as all ones
        self.images.get(&base).copied().unwrap_or(VectorTable {
            initial_sp: 0xFFFF_FFFF,
            entry: 0xFFFF_FFFF,
        })
    }

    fn disable_mpu(&mut self) {
        self.log.record(SimEvent::MpuDisabled);
    }

    fn invalidate_caches(&mut self) {
        self.log.record(SimEvent::CachesInvalidated);
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        self.words.insert(addr, value);
        self.log.record(SimEvent::WordWritten(addr, value));
    }

    fn jump(&mut self, target: VectorTable) {
        self.log.record(SimEvent::Jumped(target));
        if !self.jump_returns {
            halt(Halt::Jumped(target));
        }
    }
}

// =============================================================================
// Board
// =============================================================================

pub struct SimBoard {
    pub system: SimSystem,
    pub display: SimDisplay,
    pub audio: SimAudio,
    pub storage: SimStorage,
    pub settings: SimSettings,
    pub ui: SimUi,
    pub flash_alloc: SimFlashAlloc,
    pub magic: SimMagic,
    pub backup: SimMagic,
    pub handoff: SimHandoff,
    log: EventLog,
}

impl SimBoard {
    /// Board with a mounted, empty SD card, awake at t=0
    pub fn new() -> Self {
        let log = EventLog::default();
        let clock = Rc::new(Cell::new(0));
        let fb = FramebufferLayout::default();

        Self {
            system: SimSystem {
                log: log.clone(),
                clock: clock.clone(),
                sleep_duration_ms: 60_000,
                standby_returns: false,
                battery: 80,
                watchdog_refreshes: 0,
            },
            display: SimDisplay {
                log: log.clone(),
                backlight: 200,
                configured_brightness: 200,
                framebuffer: vec![0xA5; fb.size()],
            },
            audio: SimAudio {
                log: log.clone(),
                sample_rate: 32_000,
                playing: true,
                speaker: true,
            },
            storage: SimStorage {
                log: log.clone(),
                clock,
                mounted: true,
                files: BTreeMap::new(),
                durable: BTreeMap::new(),
                dirs: BTreeSet::new(),
                short_write_limit: None,
                fail_mkdir: false,
                fail_mount: false,
                fail_open: BTreeSet::new(),
                commits: 0,
            },
            settings: SimSettings {
                log: log.clone(),
                staged: SettingsValues::default(),
                durable: SettingsValues::default(),
                commits: 0,
            },
            ui: SimUi {
                log: log.clone(),
                tab: 0,
            },
            flash_alloc: SimFlashAlloc {
                log: log.clone(),
                cached: BTreeSet::new(),
            },
            magic: SimMagic {
                log: log.clone(),
                value: 0,
                backup_domain: false,
            },
            backup: SimMagic {
                log: log.clone(),
                value: 0,
                backup_domain: true,
            },
            handoff: SimHandoff {
                log: log.clone(),
                images: BTreeMap::new(),
                words: BTreeMap::new(),
                jump_returns: false,
            },
            log,
        }
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.log.events()
    }

    /// Cut power right after `event` is observed
    pub fn cut_power_after(&mut self, event: SimEvent) {
        self.log.0.borrow_mut().cut_after = Some(event);
    }

    /// Drop everything that was not committed and reboot the devices.
    ///
    /// The RAM boot magic is undefined after a power cycle; the backup
    /// register keeps its value.
    pub fn power_loss(&mut self) {
        self.log.0.borrow_mut().cut_after = None;
        self.storage.power_loss();
        self.settings.load();
        self.magic.value = 0;
        self.storage.mounted = true;
    }
}

impl Platform for SimBoard {
    fn peripherals(&mut self) -> Peripherals<'_> {
        Peripherals {
            system: &mut self.system,
            display: &mut self.display,
            audio: &mut self.audio,
            storage: &mut self.storage,
            settings: &mut self.settings,
            ui: &mut self.ui,
            flash_alloc: &mut self.flash_alloc,
            magic: &mut self.magic,
            backup: &mut self.backup,
            handoff: &mut self.handoff,
        }
    }
}

// =============================================================================
// Emulator core double
// =============================================================================

/// What a [`ScriptedCore`] was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreLog {
    pub loads: Vec<Option<String>>,
    pub saves: Vec<String>,
    pub shutdowns: u32,
    pub resumes: u32,
}

/// State handlers that write a fixed blob through storage.
pub struct ScriptedCore {
    pub state: Vec<u8>,
    pub load_result: bool,
    pub screenshot: Option<Vec<u8>>,
    pub log: Rc<RefCell<CoreLog>>,
}

impl Default for ScriptedCore {
    fn default() -> Self {
        Self {
            // Byte 0 is the slot index the core last used
            state: vec![0xFF, 1, 2, 3, 4, 5, 6, 7],
            load_result: true,
            screenshot: None,
            log: Rc::new(RefCell::new(CoreLog::default())),
        }
    }
}

impl ScriptedCore {
    /// Box the core and keep a handle on its log
    pub fn boxed(self) -> (Box<dyn StateHandlers>, Rc<RefCell<CoreLog>>) {
        let log = self.log.clone();
        (Box::new(self), log)
    }
}

impl StateHandlers for ScriptedCore {
    fn load_state(&mut self, _storage: &mut dyn Storage, path: Option<&str>) -> bool {
        self.log.borrow_mut().loads.push(path.map(|p| p.to_string()));
        self.load_result
    }

    fn save_state(&mut self, storage: &mut dyn Storage, path: &str) -> bool {
        self.log.borrow_mut().saves.push(path.to_string());
        write_all(storage, path, &self.state).is_ok()
    }

    fn screenshot(&mut self) -> Option<&[u8]> {
        self.screenshot.as_deref()
    }

    fn shutdown(&mut self) {
        self.log.borrow_mut().shutdowns += 1;
    }

    fn on_resume_from_sleep(&mut self) {
        self.log.borrow_mut().resumes += 1;
    }
}
