#![no_main]

use libfuzzer_sys::fuzz_target;
use modinit::CilAssembly;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut assembly) = CilAssembly::from_mem(data.to_vec(), None) {
        if modinit::initializer::inject(&mut assembly, true).is_ok() {
            let _ = assembly.to_memory();
        }
    }
});
