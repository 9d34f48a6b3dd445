//! The +3 floppy disk controller operated through its I/O ports.
use std::fs;
use std::path::PathBuf;

use rand::prelude::*;
use rand::rngs::SmallRng;

use spectact::formats::vfd::{DiskError, VirtualDiskImage};
use spectact::peripherals::fdc::{FloppyController, MainStatus};

const MSR_PORT: u16 = 0x2FFD;
const DATA_PORT: u16 = 0x3FFD;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("spectact-floppy-{}-{}.vfd", std::process::id(), name))
}

fn status(fdc: &mut FloppyController) -> MainStatus {
    MainStatus::from_bits_retain(fdc.read_port(MSR_PORT).unwrap())
}

fn out(fdc: &mut FloppyController, bytes: &[u8]) {
    for &byte in bytes {
        assert!(status(fdc).contains(MainStatus::RQM));
        assert!(!status(fdc).contains(MainStatus::DIO));
        assert!(fdc.write_port(DATA_PORT, byte));
    }
}

fn input(fdc: &mut FloppyController) -> Vec<u8> {
    let mut bytes = Vec::new();
    while status(fdc).contains(MainStatus::DIO) {
        bytes.push(fdc.read_port(DATA_PORT).unwrap());
    }
    bytes
}

fn seek(fdc: &mut FloppyController, head: u8, track: u8) {
    out(fdc, &[0x0F, head << 2, track]);
    out(fdc, &[0x08]);
    assert_eq!(input(fdc), [0x20 | head << 2, track]);
}

#[test]
fn floppy_round_trip_covers_whole_disk() {
    let path = temp_path("round-trip");
    let mut fdc = FloppyController::new();
    fdc.insert_disk(0, VirtualDiskImage::create(&path).unwrap());
    out(&mut fdc, &[0x03, 0xAF, 0x03]);

    let mut rng = SmallRng::seed_from_u64(0x5EC7);
    let mut sectors = Vec::new();
    for head in 0..2u8 {
        for track in 0..40u8 {
            seek(&mut fdc, head, track);
            for sector in 1..=9u8 {
                let mut data = vec![0u8; 512];
                rng.fill_bytes(&mut data);
                out(&mut fdc, &[0x45, head << 2, track, head, sector, 2, 9, 0x2A, 0xFF]);
                assert!(status(&mut fdc).contains(MainStatus::EXM));
                out(&mut fdc, &data);
                let st1 = if sector == 9 { 0x80 } else { 0 };
                assert_eq!(input(&mut fdc), [head << 2, st1, 0, track, head, sector, 2]);
                sectors.push(((head, track, sector), data));
            }
        }
    }
    for ((head, track, sector), data) in sectors {
        if sector == 1 {
            seek(&mut fdc, head, track);
        }
        out(&mut fdc, &[0x46, head << 2, track, head, sector, 2, 9, 0x2A, 0xFF]);
        let result = input(&mut fdc);
        assert_eq!(result.len(), 512 + 7);
        assert_eq!(&result[..512], &data[..]);
        assert_eq!(result[512], head << 2);
    }
    assert_eq!(status(&mut fdc), MainStatus::RQM);

    let disk = fdc.eject_disk(0).unwrap();
    let reopened = VirtualDiskImage::open(&path).unwrap();
    assert_eq!(reopened, disk);
    assert!(matches!(disk.read_data(0, 40, 1, 512), Err(DiskError::InvalidTrack(40))));
    assert!(matches!(disk.read_data(0, 0, 0, 512), Err(DiskError::InvalidSector(0))));
    assert!(matches!(disk.read_data(0, 0, 10, 512), Err(DiskError::InvalidSector(10))));
    assert!(matches!(disk.write_data(2, 0, 1, &[0]), Err(DiskError::InvalidHead(2))));
    assert!(matches!(disk.write_data(0, 0, 1, &[]), Err(DiskError::InvalidLength(0))));
    fs::remove_file(&path).unwrap();
}

#[test]
fn floppy_format_then_read_id() {
    let path = temp_path("format");
    let mut fdc = FloppyController::new();
    fdc.insert_disk(1, VirtualDiskImage::create(&path).unwrap());
    out(&mut fdc, &[0x0F, 0x01, 20, 0x08]);
    assert_eq!(input(&mut fdc), [0x21, 20]);
    out(&mut fdc, &[0x4D, 0x01, 2, 9, 0x2A, 0xE5]);
    assert_eq!(input(&mut fdc), [0x01, 0, 0, 20, 0, 9, 2]);
    for sector in 1..=9 {
        out(&mut fdc, &[0x4A, 0x01]);
        assert_eq!(input(&mut fdc), [0x01, 0, 0, 20, 0, sector, 2]);
        out(&mut fdc, &[0x46, 0x01, 20, 0, sector, 2, 9, 0x2A, 0xFF]);
        let result = input(&mut fdc);
        assert!(result[..512].iter().all(|&b| b == 0xE5));
    }
    // the other drive is empty
    out(&mut fdc, &[0x46, 0x00, 0, 0, 1, 2, 9, 0x2A, 0xFF]);
    assert_eq!(input(&mut fdc)[0], 0x48);
    fs::remove_file(&path).unwrap();
}
