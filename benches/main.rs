// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

use std::io::Cursor;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use trajstream::prelude::*;

const NATOMS: usize = 10_000;
const NFRAMES: usize = 20;

fn random_group(rng: &mut StdRng) -> AtomicGroup {
    (0..NATOMS)
        .map(|i| {
            let position = Vector3D::new(
                rng.gen_range(0.0..100.0),
                rng.gen_range(0.0..100.0),
                rng.gen_range(0.0..100.0),
            );
            Atom::new(i + 1, "C", position).with_index(i)
        })
        .collect::<AtomicGroup>()
        .with_box(SimBox::from([100.0, 100.0, 100.0]))
}

fn benchmark(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1995);
    let frames: Vec<AtomicGroup> = (0..NFRAMES).map(|_| random_group(&mut rng)).collect();

    let nm_coords: Vec<[f32; 3]> = frames[0]
        .iter()
        .map(|atom| {
            let p = atom.get_position();
            [p.x / 10.0, p.y / 10.0, p.z / 10.0]
        })
        .collect();

    let mut codec = CoordCodec::new();
    let compressed = codec.compress(&nm_coords, 1000.0).unwrap();

    c.bench_function("CoordCodec::compress", |b| {
        b.iter(|| {
            std::hint::black_box(codec.compress(&nm_coords, 1000.0).unwrap());
        })
    });

    let mut decompressed = Vec::with_capacity(NATOMS);
    c.bench_function("CoordCodec::decompress", |b| {
        b.iter(|| {
            codec
                .decompress(&compressed, NATOMS, &mut decompressed)
                .unwrap();
            std::hint::black_box(&decompressed);
        })
    });

    let mut dcd_bytes = Cursor::new(Vec::new());
    {
        let mut writer = DcdWriter::from_writer(&mut dcd_bytes);
        for frame in &frames {
            writer.write_frame(frame).unwrap();
        }
    }

    let mut xtc_bytes = Vec::new();
    {
        let mut writer = XtcWriter::from_writer(&mut xtc_bytes);
        for frame in &frames {
            writer.write_frame(frame).unwrap();
        }
    }

    let mut model = AtomicGroup::with_n_atoms(NATOMS);

    let mut dcd = TrajReader::new(Dcd::from_reader(Cursor::new(dcd_bytes.into_inner())).unwrap())
        .unwrap();
    c.bench_function("DcdReader::read_frame (all frames)", |b| {
        b.iter(|| {
            dcd.rewind().unwrap();
            while dcd.read_frame().unwrap() {
                dcd.update_group_coords(&mut model).unwrap();
            }
            std::hint::black_box(&model);
        })
    });

    let mut xtc = TrajReader::new(Xtc::from_reader(Cursor::new(xtc_bytes)).unwrap()).unwrap();
    c.bench_function("XtcReader::read_frame (all frames)", |b| {
        b.iter(|| {
            xtc.rewind().unwrap();
            while xtc.read_frame().unwrap() {
                xtc.update_group_coords(&mut model).unwrap();
            }
            std::hint::black_box(&model);
        })
    });

    c.bench_function("XtcReader::read_frame_at (last frame)", |b| {
        b.iter(|| {
            xtc.read_frame_at(NFRAMES - 1).unwrap();
            std::hint::black_box(xtc.coords());
        })
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
