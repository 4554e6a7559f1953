use framelink_core::protocol::{CobsCodec, Interface, LoopDevice, Packet, StreamState};
use std::thread;
use std::time::{Duration, Instant};

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();

    println!("FrameLink loopback demo");
    println!("Every frame written to the loop device echoes straight back.\n");

    let device = LoopDevice::new();
    let link = Interface::new(Box::new(device), CobsCodec::<Packet>::new());

    link.on_receive()
        .subscribe(|packet: &Packet| println!("[event] received: {:?}", packet));

    let deadline = Instant::now() + Duration::from_secs(1);
    while link.state() != StreamState::Running && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if link.state() != StreamState::Running {
        eprintln!("loopback device failed to come up");
        std::process::exit(1);
    }
    println!("link running\n");

    // Fire and forget.
    let hello = Packet::new(0x01, 0x02, b"hello".to_vec());
    println!("sending: {:?}", hello);
    link.send(&hello);
    thread::sleep(Duration::from_millis(100));

    // Request/response: wait for the echo of this exact packet.
    let ping = Packet::new(0x01, 0x02, vec![0x50, 0x49, 0x4E, 0x47]);
    let expected = ping.clone();
    println!("\ntransmitting and waiting for the echo: {:?}", ping);
    match link.transmit(
        &ping,
        Some(Box::new(move |p: &Packet| *p == expected)),
        Some(Duration::from_secs(1)),
    ) {
        Some(reply) => println!("echo came back: {:?}", reply),
        None => println!("timed out waiting for the echo"),
    }

    link.stop();
    println!("\nstream stopped, state: {:?}", link.state());
}
