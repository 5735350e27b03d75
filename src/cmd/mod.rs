use anyhow::{Context, Result};
use dhanvantri::{analysis, server, Client, EnvConfig, InferenceEngine, Relay};
use futures::StreamExt;
use std::io::{self, Write};

fn client(config: &EnvConfig) -> Result<Client> {
    Client::new(config.engine.clone()).context("building engine client")
}

pub async fn serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = EnvConfig::from_env();
    if let Some(host) = host {
        config.listen.host = host;
    }
    if let Some(port) = port {
        config.listen.port = port;
    }
    server::serve(config).await
}

pub async fn analyze(symptoms: &str) -> Result<()> {
    let config = EnvConfig::from_env();
    let client = client(&config)?;

    let result = analysis::analyze(&client, Some(symptoms)).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

pub async fn chat(prompt: &str) -> Result<()> {
    let config = EnvConfig::from_env();
    let client = client(&config)?;

    let upstream = client.stream_generate(prompt).await?;
    let mut stream = Relay::new(upstream)
        .idle_timeout(config.engine.stream_idle_timeout)
        .spawn(config.relay_buffer);

    let mut stdout = io::stdout();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("response cut off")?;
        stdout.write_all(&chunk)?;
        stdout.flush()?;
    }
    println!();

    Ok(())
}

pub async fn version() -> Result<()> {
    println!("dhanvantri version {}", env!("CARGO_PKG_VERSION"));

    let config = EnvConfig::from_env();
    let client = client(&config)?;
    match client.version().await {
        Ok(engine_version) => println!("engine version: {}", engine_version),
        Err(e) => eprintln!("engine unreachable at {}: {}", config.engine.base_url, e),
    }

    Ok(())
}
