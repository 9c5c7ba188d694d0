use std::net::SocketAddr;

use tokio::net::TcpListener;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut options = dogpush_testserver::IntakeOptions::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "--api-key" => {
                options.api_key = Some(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("--api-key requires a value"))?,
                );
            }
            "--instance-id" => {
                options.instance_id = Some(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("--instance-id requires a value"))?,
                );
            }
            "-h" | "--help" => {
                eprintln!(
                    "dogpush-testserver\n\nUSAGE:\n  dogpush-testserver [--bind 127.0.0.1:0] [--api-key KEY] [--instance-id ID]\n\nOUTPUT:\n  Prints INTAKE_URL=<url> once ready, then one JSON line per accepted series payload."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let state = dogpush_testserver::IntakeState::new(options);
    let app = dogpush_testserver::router(state.clone());

    println!("INTAKE_URL=http://{addr}");

    let printer = tokio::spawn(async move {
        let mut printed = 0;
        let mut tick = tokio::time::interval(std::time::Duration::from_millis(200));
        loop {
            tick.tick().await;
            for payload in state.received().iter().skip(printed) {
                printed += 1;
                match serde_json::to_string(payload) {
                    Ok(line) => println!("{line}"),
                    Err(e) => eprintln!("failed to encode payload: {e}"),
                }
            }
        }
    });

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
    });

    serve.await?;
    printer.abort();
    Ok(())
}
