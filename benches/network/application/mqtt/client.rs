use cellmqtt::network::application::mqtt::{
    Client, ClientInfo, Event, Packet, Publish, QoS, try_decode,
};
use cellmqtt::network::{Open, Shutdown, Write};
use criterion::{Criterion, Throughput};
use std::hint::black_box;

/// Modem that swallows every byte.
#[derive(Debug)]
struct SinkModem;

impl Open for SinkModem {
    type Error = ();
    fn open(&mut self, _host: &str, _port: u16) -> Result<(), ()> {
        Ok(())
    }
}

impl Write for SinkModem {
    type Error = ();
    fn write(&mut self, buf: &[u8]) -> Result<usize, ()> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

impl Shutdown for SinkModem {
    type Error = ();
    fn shutdown(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

type BenchClient = Client<SinkModem, fn() -> u32, usize, 1024, 1024, 16>;

fn count_events(count: &mut usize, _event: &Event<'_>) {
    *count += 1;
}

fn now() -> u32 {
    0
}

fn setup_client() -> BenchClient {
    let mut client: BenchClient = Client::new(SinkModem, now as fn() -> u32, 0);
    client
        .connect(
            "broker.bench",
            1883,
            &ClientInfo::new("cellmqtt-bench"),
            count_events,
        )
        .expect("Failed to connect");
    client.on_transport_connected();
    client
        .receive(&[0x20, 0x02, 0x00, 0x00])
        .expect("Failed to receive CONNACK");
    client
}

fn encode(packet: Packet<'_>) -> heapless::Vec<u8, 1024> {
    let mut buf = heapless::Vec::new();
    packet.encode(&mut buf).expect("Failed to encode");
    buf
}

pub fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let payload = [0x42u8; 256];
    let packet = Packet::Publish(Publish {
        topic: "fleet/tracker-7/pos",
        payload: &payload,
        qos: QoS::AtLeastOnce,
        packet_id: 17,
        dup: false,
        retain: false,
    });
    let frame = encode(packet);
    group.throughput(Throughput::Bytes(frame.len() as u64));

    group.bench_function("encode_publish", |b| {
        b.iter(|| encode(black_box(packet)))
    });
    group.bench_function("decode_publish", |b| {
        b.iter(|| try_decode(black_box(&frame)).expect("Failed to decode"))
    });
    group.finish();
}

pub fn bench_receive(c: &mut Criterion) {
    let mut group = c.benchmark_group("receive");
    let payload = [0x42u8; 100];
    let frame = encode(Packet::Publish(Publish {
        topic: "fleet/tracker-7/cmd",
        payload: &payload,
        qos: QoS::AtLeastOnce,
        packet_id: 9,
        dup: false,
        retain: false,
    }));
    group.throughput(Throughput::Bytes(frame.len() as u64 * 50));

    for chunk in [1usize, 16, 64] {
        group.bench_function(format!("publish_qos1_chunk_{chunk}"), |b| {
            b.iter_batched_ref(
                setup_client,
                |client| {
                    for _ in 0..50 {
                        for piece in frame.chunks(chunk) {
                            client.receive(piece).expect("Failed to receive");
                        }
                    }
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

pub fn bench_publish_and_ack_qos1(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_and_ack_qos1");
    let payload = b"hello world from bench qos1";
    group.throughput(Throughput::Bytes(payload.len() as u64 * 50));

    group.bench_function("publish_and_ack_qos1", |b| {
        b.iter_batched_ref(
            setup_client,
            |client| {
                for packet_id in 1..=50u16 {
                    client
                        .publish("cellmqtt/bench", payload, QoS::AtLeastOnce, false, 0)
                        .expect("Failed to publish");
                    let [hi, lo] = packet_id.to_be_bytes();
                    client
                        .receive(&[0x40, 0x02, hi, lo])
                        .expect("Failed to receive PUBACK");
                    client.poll();
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
    group.finish();
}
