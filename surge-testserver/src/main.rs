use std::net::SocketAddr;
use std::time::Duration;

use surge_testserver::{Disruption, TestServerStats, parse_range, router};
use tokio::net::TcpListener;

const USAGE: &str = "surge-testserver

USAGE:
  surge-testserver [--bind 127.0.0.1:0] [--outage N-M] [--timeouts N-M]
                   [--slow N-M] [--slow-ms MS] [--garbage N-M] [--retries N]

Request numbers are 1-based and counted across all clients.
Prints TARGET_URL=<url> to stdout once ready.";

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    args.next()
        .ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))
}

fn range_arg(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<std::ops::RangeInclusive<u64>> {
    parse_range(&next_value(args, flag)?).map_err(|e| anyhow::anyhow!("{flag}: {e}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut disruption = Disruption {
        slow_delay: Duration::from_secs(20),
        ..Disruption::default()
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => bind_addr = next_value(&mut args, "--bind")?.parse()?,
            "--outage" => disruption.bad_gateway.push(range_arg(&mut args, "--outage")?),
            "--timeouts" => disruption
                .gateway_timeout
                .push(range_arg(&mut args, "--timeouts")?),
            "--slow" => disruption.slow.push(range_arg(&mut args, "--slow")?),
            "--slow-ms" => {
                disruption.slow_delay =
                    Duration::from_millis(next_value(&mut args, "--slow-ms")?.parse()?);
            }
            "--garbage" => disruption.garbage.push(range_arg(&mut args, "--garbage")?),
            "--retries" => disruption.retries = next_value(&mut args, "--retries")?.parse()?,
            "-h" | "--help" => {
                eprintln!("{USAGE}");
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    let app = router(TestServerStats::default(), disruption);

    println!("TARGET_URL=http://{addr}/");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
    });
    serve.await?;

    Ok(())
}
