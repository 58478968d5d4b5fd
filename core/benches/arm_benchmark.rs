use criterion::{criterion_group, criterion_main, Criterion};
use oxide_advance_core::{Emulator, EmulatorOptionsBuilder};

/// A zeroed ROM decodes to an endless run of ARM `andeq r0, r0, r0` / Thumb equivalents, which is
/// enough to exercise fetch-decode-execute and the scheduler without needing a real game image on
/// disk.
fn zeroed_rom() -> Vec<u8> {
    vec![0u8; 0x8000]
}

fn cpu_step_benchmark(c: &mut Criterion) {
    let mut emulator = Emulator::new(zeroed_rom(), EmulatorOptionsBuilder::new().skip_bios(true).build()).unwrap();
    c.bench_function("cpu step", |b| b.iter(|| emulator.cpu.step()));
}

fn run_frame_benchmark(c: &mut Criterion) {
    let mut emulator = Emulator::new(zeroed_rom(), EmulatorOptionsBuilder::new().skip_bios(true).build()).unwrap();
    c.bench_function("run one frame", |b| b.iter(|| emulator.run_frame()));
}

criterion_group!(benches, cpu_step_benchmark, run_frame_benchmark);
criterion_main!(benches);
