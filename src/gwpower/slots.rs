//! Save Slot Manager
//!
//! Numbered save states per ROM, each paired with a raw framebuffer preview
//! the launcher shows in its slot picker.
//!
//! The first byte of slot 0's file is the index of the slot the core last
//! used (`0xFF` for none). Everything after it belongs to the core.
//!
//! A [`SaveSlotSet`] is rebuilt from storage metadata on every call; nothing
//! here caches what is on the card.

use alloc::string::String;
use alloc::vec::Vec;
use log::{debug, info, warn};

use crate::app::AppContext;
use crate::config::FramebufferLayout;
use crate::error::{Error, Result};
use crate::hal::storage::{dirname, write_all};
use crate::hal::{Peripherals, Storage};
use crate::paths::{path_for, PathKind};

/// Sentinel for "no last-used slot" in the primary save file
pub const LAST_USED_NONE: u8 = 0xFF;

/// Which slot a load or save targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotIndex {
    /// Keep whatever is in memory
    NoOp,
    /// The auto-resume slot written on power off. Loading it hands the core
    /// no path; the core resumes from its own backing.
    PowerOff,
    /// A numbered slot
    Explicit(u8),
}

/// One slot as found on the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSlot {
    pub index: u8,
    pub file_path: String,
    pub preview_path: String,
    pub exists: bool,
    pub is_last_used: bool,
    pub mod_time: u64,
}

/// Snapshot of every slot of one ROM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSlotSet {
    slots: Vec<SaveSlot>,
    used: usize,
    latest: Option<usize>,
    last_used: Option<usize>,
}

impl SaveSlotSet {
    pub fn total(&self) -> usize {
        self.slots.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn slots(&self) -> &[SaveSlot] {
        &self.slots
    }

    pub fn get(&self, index: u8) -> Option<&SaveSlot> {
        self.slots.get(index as usize)
    }

    /// Existing slot with the newest modification time
    pub fn latest(&self) -> Option<&SaveSlot> {
        self.latest.map(|i| &self.slots[i])
    }

    /// Slot the core reported as last used, or [`Self::latest`]
    pub fn last_used(&self) -> Option<&SaveSlot> {
        self.last_used.map(|i| &self.slots[i])
    }
}

/// Slot index stored at the start of the primary save file.
fn read_last_used_hint(storage: &mut dyn Storage, primary: &str) -> Option<u8> {
    if !storage.stat(primary).exists {
        return None;
    }

    let mut byte = [LAST_USED_NONE];
    match storage.read(primary, &mut byte) {
        Ok(1) if byte[0] != LAST_USED_NONE => Some(byte[0]),
        Ok(_) => None,
        Err(err) => {
            debug!("[Slots] no last-used hint: {}", err);
            None
        }
    }
}

/// Build the slot table for `rom_path` from storage metadata.
pub fn enumerate(storage: &mut dyn Storage, rom_path: &str, count: u8) -> Result<SaveSlotSet> {
    let primary = path_for(PathKind::SaveState(0), rom_path)?;
    let hint = read_last_used_hint(storage, &primary);

    let mut slots: Vec<SaveSlot> = Vec::with_capacity(count as usize);
    let mut used = 0;
    let mut latest: Option<usize> = None;
    let mut last_used: Option<usize> = None;

    for index in 0..count {
        let file_path = path_for(PathKind::SaveState(index), rom_path)?;
        let preview_path = path_for(PathKind::Screenshot(index), rom_path)?;
        let stat = storage.stat(&file_path);

        if stat.exists {
            let pos = slots.len();
            // Strictly newer wins, so the first of equal slots stays
            if latest.map_or(true, |l| stat.mtime > slots[l].mod_time) {
                latest = Some(pos);
            }
            if hint == Some(index) {
                last_used = Some(pos);
            }
            used += 1;
        }

        slots.push(SaveSlot {
            index,
            file_path,
            preview_path,
            exists: stat.exists,
            is_last_used: false,
            mod_time: stat.mtime,
        });
    }

    let last_used = last_used.or(latest);
    if let Some(i) = last_used {
        slots[i].is_last_used = true;
    }

    Ok(SaveSlotSet {
        slots,
        used,
        latest,
        last_used,
    })
}

/// Restore a state through the active core.
///
/// Returns the core's own verdict; nothing is retried here.
pub fn load(ctx: &mut AppContext, p: &mut Peripherals<'_>, slot: SlotIndex) -> Result<bool> {
    let app = ctx.active_mut();
    let rom = app.rom_path.as_deref().ok_or(Error::NoActiveRom)?;
    if !app.has_handlers() {
        return Err(Error::NoLoadHandler);
    }

    let path = match slot {
        SlotIndex::NoOp => {
            debug!("[Slots] nothing to load, keeping state in memory");
            return Ok(true);
        }
        SlotIndex::PowerOff => None,
        SlotIndex::Explicit(n) => Some(path_for(PathKind::SaveState(n), rom)?),
    };

    match &path {
        Some(path) => info!("[Slots] loading state from '{}'", path),
        None => info!("[Slots] loading state from sram"),
    }

    let handlers = app.handlers().ok_or(Error::NoLoadHandler)?;
    Ok(handlers.load_state(p.storage, path.as_deref()))
}

/// Write a state through the active core, then its preview.
///
/// A failed state write returns `Ok(false)` with nothing committed. A
/// failed preview is only logged; the state itself is already good.
pub fn save(
    ctx: &mut AppContext,
    p: &mut Peripherals<'_>,
    slot: SlotIndex,
    layout: &FramebufferLayout,
) -> Result<bool> {
    let app = ctx.active_mut();
    let rom = app.rom_path.as_deref().ok_or(Error::NoActiveRom)?;
    if !app.has_handlers() {
        return Err(Error::NoSaveHandler);
    }

    let (path, preview) = match slot {
        SlotIndex::NoOp => return Err(Error::InvalidSlot),
        SlotIndex::PowerOff => (path_for(PathKind::SaveStateOff, rom)?, None),
        SlotIndex::Explicit(n) => (
            path_for(PathKind::SaveState(n), rom)?,
            Some(path_for(PathKind::Screenshot(n), rom)?),
        ),
    };

    info!("[Slots] saving state to '{}'", path);

    if let Err(err) = p.storage.mkdir(dirname(&path)) {
        warn!("[Slots] {}, save might fail", err);
    }

    let handlers = app.handlers().ok_or(Error::NoSaveHandler)?;
    if !handlers.save_state(p.storage, &path) {
        warn!("[Slots] core failed to save '{}'", path);
        return Ok(false);
    }

    if let Some(preview) = preview {
        if let Err(err) = write_preview(ctx, p, &preview, layout) {
            warn!("[Slots] preview not saved: {}", err);
        }
    }

    p.storage.commit();
    Ok(true)
}

/// Write a raw framebuffer capture to `path` and commit it.
pub fn screenshot(
    ctx: &mut AppContext,
    p: &mut Peripherals<'_>,
    path: &str,
    layout: &FramebufferLayout,
) -> Result<()> {
    write_preview(ctx, p, path, layout)?;
    p.storage.commit();
    Ok(())
}

fn write_preview(
    ctx: &mut AppContext,
    p: &mut Peripherals<'_>,
    path: &str,
    layout: &FramebufferLayout,
) -> Result<()> {
    if let Err(err) = p.storage.mkdir(dirname(path)) {
        debug!("[Slots] {}", err);
    }

    let from_core = ctx.active_mut().handlers().and_then(|h| h.screenshot());
    let data = match from_core {
        Some(data) => data,
        None => {
            // Whatever the LCD shows, menu overlay included
            p.display.wait_for_vblank();
            p.display.inactive_framebuffer()
        }
    };

    let len = data.len().min(layout.size());
    write_all(p.storage, path, &data[..len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::Platform;
    use crate::platform::sim::{CoreLog, ScriptedCore, SimBoard, SimEvent};
    use alloc::rc::Rc;
    use alloc::string::ToString;
    use alloc::vec;
    use core::cell::RefCell;
    use pretty_assertions::assert_eq;

    const MARIO: &str = "/roms/nes/mario.nes";

    fn session(core: ScriptedCore) -> (AppContext, Rc<RefCell<CoreLog>>) {
        let mut ctx = AppContext::new();
        ctx.set_rom(Some(MARIO));
        let (handlers, log) = core.boxed();
        ctx.activate(handlers);
        (ctx, log)
    }

    #[test]
    fn test_save_then_enumerate() {
        let mut board = SimBoard::new();
        board.system.advance(5_000);
        let (mut ctx, log) = session(ScriptedCore::default());

        let saved = save(&mut ctx, &mut board.peripherals(), SlotIndex::Explicit(2), &FramebufferLayout::default());
        assert_eq!(saved, Ok(true));
        assert_eq!(log.borrow().saves, vec!["/savestate/nes/mario.nes-2.sav".to_string()]);

        let set = enumerate(&mut board.storage, MARIO, 4).unwrap();
        assert_eq!(set.total(), 4);
        assert_eq!(set.used(), 1);

        let slot = set.get(2).unwrap();
        assert!(slot.exists);
        assert!(slot.is_last_used);
        assert!(slot.mod_time >= 5);
        assert_eq!(set.last_used().map(|s| s.index), Some(2));
        for other in [0, 1, 3] {
            assert!(!set.get(other).unwrap().exists);
        }

        assert_eq!(board.storage.commits, 1);
        let preview = board.storage.durable_file("/savestate/nes/mario.nes-2.raw").unwrap();
        assert_eq!(preview.data.len(), FramebufferLayout::default().size());
    }

    #[test]
    fn test_last_used_falls_back_to_latest() {
        let mut board = SimBoard::new();
        board.storage.seed("/savestate/nes/mario.nes-0.sav", &[3, 0, 0], 10);
        board.storage.seed("/savestate/nes/mario.nes-1.sav", &[0xAA], 20);

        let set = enumerate(&mut board.storage, MARIO, 4).unwrap();

        assert_eq!(set.used(), 2);
        assert_eq!(set.latest().map(|s| s.index), Some(1));
        assert_eq!(set.last_used().map(|s| s.index), Some(1));
        assert!(!set.get(0).unwrap().is_last_used);
    }

    #[test]
    fn test_last_used_hint_wins_when_slot_exists() {
        let mut board = SimBoard::new();
        board.storage.seed("/savestate/nes/mario.nes-0.sav", &[1], 30);
        board.storage.seed("/savestate/nes/mario.nes-1.sav", &[0xAA], 20);

        let set = enumerate(&mut board.storage, MARIO, 4).unwrap();

        assert_eq!(set.latest().map(|s| s.index), Some(0));
        assert_eq!(set.last_used().map(|s| s.index), Some(1));
    }

    #[test]
    fn test_latest_tie_keeps_first_slot() {
        let mut board = SimBoard::new();
        board.storage.seed("/savestate/nes/mario.nes-1.sav", &[0xAA], 20);
        board.storage.seed("/savestate/nes/mario.nes-3.sav", &[0xAA], 20);

        let set = enumerate(&mut board.storage, MARIO, 4).unwrap();

        assert_eq!(set.latest().map(|s| s.index), Some(1));
    }

    #[test]
    fn test_empty_card() {
        let mut board = SimBoard::new();

        let set = enumerate(&mut board.storage, MARIO, 4).unwrap();

        assert_eq!(set.used(), 0);
        assert_eq!(set.last_used(), None);
        assert_eq!(set.latest(), None);
    }

    #[test]
    fn test_short_write_short_circuits() {
        let mut board = SimBoard::new();
        board.storage.short_write_limit = Some(3);
        let (mut ctx, _log) = session(ScriptedCore::default());

        let saved = save(&mut ctx, &mut board.peripherals(), SlotIndex::Explicit(1), &FramebufferLayout::default());

        assert_eq!(saved, Ok(false));
        assert!(board.storage.file("/savestate/nes/mario.nes-1.raw").is_none());
        assert_eq!(board.storage.commits, 0);
        assert!(board.storage.durable_file("/savestate/nes/mario.nes-1.sav").is_none());
        assert!(!board.log().contains(&SimEvent::StorageCommit));
    }

    #[test]
    fn test_contract_errors() {
        let mut board = SimBoard::new();
        let layout = FramebufferLayout::default();
        let mut ctx = AppContext::new();

        assert_eq!(load(&mut ctx, &mut board.peripherals(), SlotIndex::Explicit(0)), Err(Error::NoActiveRom));
        assert_eq!(save(&mut ctx, &mut board.peripherals(), SlotIndex::Explicit(0), &layout), Err(Error::NoActiveRom));

        ctx.set_rom(Some(MARIO));
        assert_eq!(load(&mut ctx, &mut board.peripherals(), SlotIndex::Explicit(0)), Err(Error::NoLoadHandler));
        assert_eq!(save(&mut ctx, &mut board.peripherals(), SlotIndex::Explicit(0), &layout), Err(Error::NoSaveHandler));

        let (handlers, _log) = ScriptedCore::default().boxed();
        ctx.activate(handlers);
        assert_eq!(save(&mut ctx, &mut board.peripherals(), SlotIndex::NoOp, &layout), Err(Error::InvalidSlot));
    }

    #[test]
    fn test_load_resolves_paths() {
        let mut board = SimBoard::new();
        let (mut ctx, log) = session(ScriptedCore::default());

        assert_eq!(load(&mut ctx, &mut board.peripherals(), SlotIndex::Explicit(1)), Ok(true));
        assert_eq!(load(&mut ctx, &mut board.peripherals(), SlotIndex::PowerOff), Ok(true));
        assert_eq!(load(&mut ctx, &mut board.peripherals(), SlotIndex::NoOp), Ok(true));

        // NoOp never reaches the core
        assert_eq!(
            log.borrow().loads,
            vec![Some("/savestate/nes/mario.nes-1.sav".to_string()), None]
        );
    }

    #[test]
    fn test_load_returns_core_verdict() {
        let mut board = SimBoard::new();
        let core = ScriptedCore {
            load_result: false,
            ..ScriptedCore::default()
        };
        let (mut ctx, _log) = session(core);

        assert_eq!(load(&mut ctx, &mut board.peripherals(), SlotIndex::Explicit(0)), Ok(false));
    }

    #[test]
    fn test_power_off_save_skips_preview() {
        let mut board = SimBoard::new();
        let (mut ctx, _log) = session(ScriptedCore::default());

        let saved = save(&mut ctx, &mut board.peripherals(), SlotIndex::PowerOff, &FramebufferLayout::default());

        assert_eq!(saved, Ok(true));
        assert!(board.storage.durable_file("/savestate/off.sav").is_some());
        assert!(!board.log().contains(&SimEvent::Vblank));
        assert_eq!(board.storage.commits, 1);
    }

    #[test]
    fn test_mkdir_failure_still_saves() {
        let mut board = SimBoard::new();
        board.storage.fail_mkdir = true;
        let (mut ctx, log) = session(ScriptedCore::default());

        let saved = save(&mut ctx, &mut board.peripherals(), SlotIndex::Explicit(0), &FramebufferLayout::default());

        assert_eq!(saved, Ok(true));
        assert_eq!(log.borrow().saves.len(), 1);
        assert!(board.storage.durable_file("/savestate/nes/mario.nes-0.sav").is_some());
    }

    #[test]
    fn test_core_screenshot_preferred() {
        let mut board = SimBoard::new();
        let core = ScriptedCore {
            screenshot: Some(vec![7; 16]),
            ..ScriptedCore::default()
        };
        let (mut ctx, _log) = session(core);

        let saved = save(&mut ctx, &mut board.peripherals(), SlotIndex::Explicit(3), &FramebufferLayout::default());

        assert_eq!(saved, Ok(true));
        let preview = board.storage.file("/savestate/nes/mario.nes-3.raw").unwrap();
        assert_eq!(preview.data, vec![7; 16]);
        assert!(!board.log().contains(&SimEvent::Vblank));
    }

    #[test]
    fn test_standalone_screenshot_reports_open_failure() {
        let mut board = SimBoard::new();
        board.storage.fail_open.insert("/savestate/nes/mario.nes-0.raw".to_string());
        let mut ctx = AppContext::new();

        let result = screenshot(
            &mut ctx,
            &mut board.peripherals(),
            "/savestate/nes/mario.nes-0.raw",
            &FramebufferLayout::default(),
        );

        assert_eq!(
            result,
            Err(Error::Open {
                path: "/savestate/nes/mario.nes-0.raw".to_string()
            })
        );
        assert_eq!(board.storage.commits, 0);
        let vblank = board.log().position(&SimEvent::Vblank);
        assert!(vblank.is_some());
    }
}
