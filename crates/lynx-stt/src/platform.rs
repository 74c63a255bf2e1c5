//! Platform and CPU detection for native artifact selection.
//!
//! The Lynx SDK lays its shared libraries out as
//! `lib/<os>/<cpu>/<library file>`. Desktop targets resolve statically from
//! compile-time cfg; ARM Linux boards additionally need the CPU part read
//! from `/proc/cpuinfo` to pick the right build.

use std::path::PathBuf;

use crate::error::LynxError;

#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
pub fn library_subpath() -> Result<PathBuf, LynxError> {
    Ok(PathBuf::from("mac/x86_64/liblynx.dylib"))
}

#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
pub fn library_subpath() -> Result<PathBuf, LynxError> {
    Ok(PathBuf::from("mac/arm64/liblynx.dylib"))
}

#[cfg(target_os = "windows")]
pub fn library_subpath() -> Result<PathBuf, LynxError> {
    Ok(PathBuf::from("windows/amd64/liblynx.dll"))
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub fn library_subpath() -> Result<PathBuf, LynxError> {
    Ok(PathBuf::from("linux/x86_64/liblynx.so"))
}

#[cfg(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64")))]
pub fn library_subpath() -> Result<PathBuf, LynxError> {
    let cpuinfo = std::fs::read_to_string("/proc/cpuinfo")
        .map_err(|err| LynxError::UnsupportedPlatform(format!("cannot read cpuinfo: {}", err)))?;
    let board = board_from_cpuinfo(&cpuinfo)?;

    let suffix = if cfg!(target_arch = "aarch64") {
        "-aarch64"
    } else {
        ""
    };
    Ok(PathBuf::from(format!(
        "{}/{}{}/liblynx.so",
        board.family, board.cpu, suffix
    )))
}

/// An ARM board the SDK ships a dedicated library build for.
#[allow(dead_code)] // only reached at runtime on ARM Linux
#[derive(Debug)]
struct Board {
    family: &'static str,
    cpu: &'static str,
}

/// Maps the `CPU part` field of `/proc/cpuinfo` to a supported board.
#[allow(dead_code)] // only reached at runtime on ARM Linux
fn board_from_cpuinfo(cpuinfo: &str) -> Result<Board, LynxError> {
    let part = cpu_part(cpuinfo).ok_or_else(|| {
        LynxError::UnsupportedPlatform("no `CPU part` field in cpuinfo".to_string())
    })?;

    match part.as_str() {
        "0xd03" => Ok(Board {
            family: "raspberry-pi",
            cpu: "cortex-a53",
        }),
        "0xd07" => Ok(Board {
            family: "jetson",
            cpu: "cortex-a57",
        }),
        "0xd08" => Ok(Board {
            family: "raspberry-pi",
            cpu: "cortex-a72",
        }),
        "0xd0b" => Ok(Board {
            family: "raspberry-pi",
            cpu: "cortex-a76",
        }),
        other => Err(LynxError::UnsupportedPlatform(format!(
            "unrecognized CPU part {}",
            other
        ))),
    }
}

/// Extracts the first `CPU part` value from cpuinfo text.
#[allow(dead_code)]
fn cpu_part(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|line| line.starts_with("CPU part"))
        .and_then(|line| line.split(':').nth(1))
        .map(|part| part.trim().to_ascii_lowercase())
        .filter(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RPI4_CPUINFO: &str = "\
processor\t: 0
BogoMIPS\t: 108.00
Features\t: fp asimd evtstrm crc32 cpuid
CPU implementer\t: 0x41
CPU architecture: 8
CPU variant\t: 0x0
CPU part\t: 0xd08
CPU revision\t: 3
";

    #[test]
    fn cpu_part_extracted_from_rpi_cpuinfo() {
        assert_eq!(cpu_part(RPI4_CPUINFO).as_deref(), Some("0xd08"));
    }

    #[test]
    fn cpu_part_tolerates_missing_space_after_colon() {
        assert_eq!(cpu_part("CPU part\t:0xd08\n").as_deref(), Some("0xd08"));
        assert_eq!(cpu_part("CPU part: 0xD0B\n").as_deref(), Some("0xd0b"));
    }

    #[test]
    fn cpu_part_missing_yields_none() {
        assert_eq!(cpu_part("processor\t: 0\nmodel name\t: x86\n"), None);
    }

    #[test]
    fn known_parts_map_to_boards() {
        let board = board_from_cpuinfo(RPI4_CPUINFO).unwrap();
        assert_eq!(board.family, "raspberry-pi");
        assert_eq!(board.cpu, "cortex-a72");

        let jetson = board_from_cpuinfo("CPU part\t: 0xd07\n").unwrap();
        assert_eq!(jetson.family, "jetson");
        assert_eq!(jetson.cpu, "cortex-a57");
    }

    #[test]
    fn unknown_part_is_an_unsupported_platform() {
        let err = board_from_cpuinfo("CPU part\t: 0xdead\n").unwrap_err();
        assert!(matches!(err, LynxError::UnsupportedPlatform(_)));
    }
}
