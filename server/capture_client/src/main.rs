use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use log::{error, info, warn};
use tracing_subscriber::EnvFilter;

use capture_client::serial::port::{detect_device_port, SerialPortChannel};
use capture_client::{AppConfig, CaptureClient, ImageStore, SerialInterface, VERSION};

const USAGE: &str = "usage: capture_client [--port <path>] [--out <dir>] [-i|--interactive]";

#[derive(Debug, Default)]
struct Args {
    port: Option<String>,
    out: Option<PathBuf>,
    interactive: bool,
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let value_after = |flag: &str| -> anyhow::Result<Option<String>> {
        match args.iter().position(|a| a == flag) {
            Some(pos) => args
                .get(pos + 1)
                .cloned()
                .map(Some)
                .with_context(|| format!("{} には値が必要です\n{}", flag, USAGE)),
            None => Ok(None),
        }
    };

    Ok(Args {
        port: value_after("--port")?,
        out: value_after("--out")?.map(PathBuf::from),
        interactive: args.iter().any(|a| a == "-i" || a == "--interactive"),
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("capture_client=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{}", USAGE);
        return Ok(());
    }
    let args = parse_args(&args)?;

    info!("=== Capture Client v{} ===", VERSION);
    let config = AppConfig::load().context("設定の読み込みに失敗しました")?;

    let port_name = match args.port.or(config.serial_port.clone()) {
        Some(port) => port,
        None => detect_device_port()?,
    };
    let store = ImageStore::new(args.out.unwrap_or(config.image_dir.clone()));

    let channel = SerialPortChannel::open(&port_name, config.baud_rate)
        .with_context(|| format!("{} を開けません", port_name))?;
    info!("{} に接続しました", port_name);
    let mut client = CaptureClient::new(channel, config.client);

    client.wait_ready()?;

    if args.interactive {
        interactive(&mut client, &store)
    } else {
        let saved = client.capture_and_save(&store)?;
        println!("{}", saved.path.display());
        Ok(())
    }
}

/// Enter で撮影、s で再初期化、y で再同期、q で終了
fn interactive<S: SerialInterface>(
    client: &mut CaptureClient<S>,
    store: &ImageStore,
) -> anyhow::Result<()> {
    let stdin = io::stdin();
    loop {
        print!("[Enter]=撮影 s=再初期化 y=再同期 q=終了 > ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }

        match line.trim() {
            "" => match client.capture_and_save(store) {
                Ok(saved) => println!("保存しました: {} ({} bytes)", saved.path.display(), saved.size),
                Err(e) => error!("撮影に失敗しました: {}", e),
            },
            "s" => match client.request_reinit() {
                Ok(()) => println!("再初期化しました"),
                Err(e) => error!("再初期化に失敗しました: {}", e),
            },
            "y" => match client.request_resync() {
                Ok(status) => println!("{}", status),
                Err(e) => error!("再同期に失敗しました: {}", e),
            },
            "q" => return Ok(()),
            other => warn!("不明な入力: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse_args(&args(&["--port", "/dev/ttyACM0", "-i"])).unwrap();
        assert_eq!(parsed.port.as_deref(), Some("/dev/ttyACM0"));
        assert!(parsed.interactive);
        assert!(parsed.out.is_none());
    }

    #[test]
    fn test_parse_args_missing_value() {
        assert!(parse_args(&args(&["--out"])).is_err());
    }
}
