use doubao_http::DoubaoClient;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,doubao_http=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.is_empty() {
        anyhow::bail!("usage: ask <question>");
    }

    let client = DoubaoClient::from_env()?;
    let answer = client.ask(&question)?;
    println!("{answer}");

    Ok(())
}
