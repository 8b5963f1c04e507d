#![no_main]

use libfuzzer_sys::fuzz_target;
use sh4_core::{disassemble_one, Decoder, Dreamcast, ExecutionMode, MachineConfig};

const LOAD_BASE: u32 = 0x8c01_0000;

fuzz_target!(|data: &[u8]| {
    if data.len() < 6 {
        return;
    }

    let decoder = Decoder::new();
    for pair in data.chunks_exact(2) {
        let word = u16::from_le_bytes([pair[0], pair[1]]);
        let _ = decoder.decode(word);
        let _ = disassemble_one(&decoder, LOAD_BASE, word);
    }

    let addr = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let mode = if data[4] & 1 == 0 {
        ExecutionMode::Interpreter
    } else {
        ExecutionMode::Translator
    };
    let config = MachineConfig {
        execution_mode: mode,
        ram_size: 0x0010_0000,
        vblank_hz: None,
        ..MachineConfig::default()
    };
    let Ok(mut machine) = Dreamcast::create(config) else {
        return;
    };

    if let Ok(space) = machine.space() {
        let _ = space.read_u8(addr);
        let _ = space.read_u16(addr);
        let _ = space.read_u32(addr);
    }

    let mut image = data[5..].to_vec();
    image.resize(image.len().next_multiple_of(4), 0);
    if machine.memcpy_to_guest(LOAD_BASE, &image).is_err() || machine.set_pc(LOAD_BASE).is_err() {
        return;
    }
    // Guest faults must surface as exceptions or terminal errors, never panics.
    let _ = machine.run(u64::from(data[4]) * 16);
});
