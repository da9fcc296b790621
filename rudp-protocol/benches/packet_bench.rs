use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rudp_protocol::packet::{ControlFlag, Packet, PAYLOAD_SIZE};
use rudp_protocol::window::SlidingWindow;
use rudp_protocol::{compute_checksum, verify};

fn bench_data_packet_seal(c: &mut Criterion) {
    let payload = vec![0x5Au8; PAYLOAD_SIZE];
    let mut packet = Packet::data(1000, 6666, &payload).unwrap();

    c.bench_function("data_packet_seal", |b| {
        b.iter(|| {
            black_box(&mut packet).seal();
        });
    });
}

fn bench_data_packet_deserialize(c: &mut Criterion) {
    let mut packet = Packet::data(1000, 6666, &[0u8; PAYLOAD_SIZE]).unwrap();
    packet.seal();
    let bytes = packet.to_bytes();

    c.bench_function("data_packet_deserialize", |b| {
        b.iter(|| {
            let packet = Packet::from_bytes(black_box(&bytes)).unwrap();
            black_box(packet);
        });
    });
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");
    let mut packet = Packet::data(7, 6666, &[0xA5u8; PAYLOAD_SIZE]).unwrap();
    packet.seal();
    let bytes = packet.to_bytes();

    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("compute", |b| {
        b.iter(|| {
            let sum = compute_checksum(black_box(&bytes));
            black_box(sum);
        });
    });

    group.bench_function("verify", |b| {
        b.iter(|| {
            let ok = verify(black_box(&bytes));
            black_box(ok);
        });
    });

    group.finish();
}

fn bench_control_packet(c: &mut Criterion) {
    c.bench_function("control_packet_build", |b| {
        b.iter(|| {
            let packet = Packet::control(ControlFlag::Ack, black_box(6666), 6666);
            black_box(packet.to_bytes());
        });
    });
}

fn bench_window_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("sliding_window");

    group.bench_function("reserve_advance", |b| {
        let mut window: SlidingWindow<u64> = SlidingWindow::new(6666);
        let mut seq = 0u32;
        b.iter(|| {
            if let Some(slot) = window.reserve(seq) {
                *slot = seq as u64;
            }
            seq += 1;
            window.advance_to(seq);
        });
    });

    group.bench_function("contains", |b| {
        let mut window: SlidingWindow<u64> = SlidingWindow::new(6666);
        for seq in 0..6666 {
            window.reserve(seq);
        }
        b.iter(|| {
            let found = window.contains(black_box(3333));
            black_box(found);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_data_packet_seal,
    bench_data_packet_deserialize,
    bench_checksum,
    bench_control_packet,
    bench_window_ops
);
criterion_main!(benches);
