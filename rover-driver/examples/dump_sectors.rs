use clap::{Arg, Command};
use rover_driver::aggregator::{AggregationWindow, PointAggregator};
use rover_driver::decoder::FrameDecoder;
use rover_driver::margin::safety_margin;
use rover_driver::{open_port, RoverConfig};
use std::io::Read;

fn get_port_name() -> String {
    let matches = Command::new("LiDAR sector dump.")
        .about("Reads an LD19 and prints the nearest return per sector once per revolution.")
        .disable_version_flag(true)
        .arg(
            Arg::new("port")
                .help("The device path to a serial port")
                .use_value_delimiter(false)
                .required(true),
        )
        .get_matches();

    let port_name: &String = matches.get_one("port").unwrap();
    port_name.to_string()
}

fn main() {
    let config = RoverConfig::default();
    let port_name = get_port_name();
    let mut port = open_port(
        &port_name,
        config.lidar_baud_rate(),
        config.pipeline.read_timeout(),
    )
    .unwrap();

    let mut decoder = FrameDecoder::new(config.layout.clone(), config.pipeline.max_distance_mm);
    let mut aggregator = PointAggregator::new(AggregationWindow::Revolution);
    let mut buf = [0u8; 512];

    loop {
        let n = match port.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                eprintln!("{e}");
                break;
            }
        };
        decoder.feed(&buf[..n]);
        for frame in decoder.frames().flatten() {
            if !aggregator.push(frame) {
                continue;
            }
            let aggregate = aggregator.drain(&config.sectors);
            let margin = safety_margin(&config.margin, &aggregate.dynamics);
            let sectors: Vec<String> = aggregate
                .sectors
                .iter()
                .map(|(role, reading)| match reading.is_clear() {
                    true => format!("{role:?}: clear"),
                    false => format!("{role:?}: {} mm", reading.distance),
                })
                .collect();
            println!("margin {:.0} mm | {}", margin, sectors.join(" | "));
        }
    }

    println!("{:?}", decoder.stats());
}
