#![no_main]

use libfuzzer_sys::fuzz_target;
use vfscope::{
    formats::cpio::CpioArchive, FileIO, Memory, PartitionAnalyzer, PartitionTableAnalyzer,
};

fuzz_target!(|data: &[u8]| {
    let source = Memory::new(data.to_vec());
    if let Ok(archive) = CpioArchive::parse(&source) {
        for location in archive.entries().keys() {
            let _ = archive.children(location);
        }
    }
    for sector_size in [512, 4096] {
        let _ = PartitionTableAnalyzer.analyze(&source as &dyn FileIO, sector_size);
    }
});
