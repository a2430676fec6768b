use criterion::{criterion_group, criterion_main};

mod network {
    pub mod application {
        pub mod mqtt {
            pub mod client;
        }
    }
}

criterion_group!(
    benches,
    network::application::mqtt::client::bench_codec,
    network::application::mqtt::client::bench_receive,
    network::application::mqtt::client::bench_publish_and_ack_qos1
);
criterion_main!(benches);
