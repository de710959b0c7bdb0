//! File naming for everything stored next to a ROM.
//!
//! Every path is a pure function of the kind and the ROM path, so two calls
//! always agree and two slots of the same ROM never collide.
//!
//! ```text
//! /roms/nes/mario.nes
//!      └────────────┴─ relative name "/nes/mario.nes"
//!
//! /savestate/nes/mario.nes-2.sav      SaveState(2)
//! /savestate/nes/mario.nes-2.raw      Screenshot(2)
//! /savestate/off.sav                  SaveStateOff (shared by every ROM)
//! ```

use alloc::format;
use alloc::string::{String, ToString};

use crate::error::{Error, Result};

/// Base directories on the SD card.
pub mod base {
    pub const ROMS: &str = "/roms";
    pub const SAVES: &str = "/savestate";
    pub const COVERS: &str = "/covers";
    pub const CHEATS: &str = "/cheats";
    pub const CONFIG: &str = "/config";
    pub const CRC_CACHE: &str = "/cache/crc";
}

/// Kinds of per-ROM files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// Numbered save state
    SaveState(u8),
    /// Auto-resume state written on power off
    SaveStateOff,
    /// Raw framebuffer preview paired with a numbered save state
    Screenshot(u8),
    /// Backup of the previous save state
    SaveBackup,
    /// Battery-backed cartridge RAM
    Sram,
    /// The ROM itself
    RomFile,
    /// Cached content checksum
    CrcCache,
    /// Cover art
    Cover,
    CheatState,
    CheatPce,
    CheatGameGenie,
    CheatMcf,
    /// Per-system configuration file
    SystemConfig,
}

/// Name of the ROM relative to the ROM base directory.
fn relative_name(rom_path: &str) -> Result<&str> {
    let name = match rom_path.find(base::ROMS) {
        Some(idx) => &rom_path[idx + base::ROMS.len()..],
        None => rom_path,
    };

    if name.len() < 4 {
        return Err(Error::InvalidRomPath(rom_path.to_string()));
    }
    Ok(name)
}

/// Strip the extension of the last path component.
fn without_extension(name: &str) -> &str {
    let file_start = name.rfind('/').map_or(0, |idx| idx + 1);
    match name[file_start..].rfind('.') {
        Some(dot) => &name[..file_start + dot],
        None => name,
    }
}

/// Directory part including the trailing slash.
fn system_dir(name: &str) -> &str {
    match name.rfind('/') {
        Some(idx) => &name[..=idx],
        None => "",
    }
}

/// Build the path of a file of `kind` belonging to `rom_path`.
pub fn path_for(kind: PathKind, rom_path: &str) -> Result<String> {
    let name = relative_name(rom_path)?;

    let path = match kind {
        PathKind::SaveState(slot) => format!("{}{}-{}.sav", base::SAVES, name, slot),
        // One slot for all ROMs
        PathKind::SaveStateOff => format!("{}/off.sav", base::SAVES),
        PathKind::Screenshot(slot) => format!("{}{}-{}.raw", base::SAVES, name, slot),
        PathKind::SaveBackup => format!("{}{}.sav.bak", base::SAVES, name),
        PathKind::Sram => format!("{}{}.sram", base::SAVES, name),
        PathKind::RomFile => format!("{}{}", base::ROMS, name),
        PathKind::CrcCache => format!("{}{}.crc", base::CRC_CACHE, name),
        PathKind::Cover => format!("{}{}.img", base::COVERS, without_extension(name)),
        PathKind::CheatState => format!("{}{}.state", base::CHEATS, name),
        PathKind::CheatPce => format!("{}{}.pceplus", base::CHEATS, without_extension(name)),
        PathKind::CheatGameGenie => {
            format!("{}{}.ggcodes", base::CHEATS, without_extension(name))
        }
        PathKind::CheatMcf => format!("{}{}.mcf", base::CHEATS, without_extension(name)),
        PathKind::SystemConfig => format!("{}{}CONFIG", base::CONFIG, system_dir(name)),
    };

    Ok(path)
}
