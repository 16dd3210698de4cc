pub fn main() -> burgee::Result<()> {
    // Configure env_logger to see burgee SDK logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("burgee")).init();

    let base_url = std::env::var("BURGEE_BASE_URL")
        .expect("BURGEE_BASE_URL env variable should contain the API root");
    let mut client = burgee::ClientConfig::from_base_url(base_url)
        .persist_path("/tmp/burgee-snapshot.json")
        .to_client()?;

    // Block fetching the first snapshot. When the server is unreachable, this falls back to the
    // previously persisted snapshot, if any.
    if let Err(err) = client.bootstrap(false) {
        println!("error bootstrapping snapshot: {:?}", err);
    }

    // Evaluate a flag for test-entity.
    let request = burgee::EvalRequest::by_flag_key(
        "checkout-redesign",
        burgee::EvalContext::new("test-entity").with_property("tier", "pro"),
    );
    let result = client.evaluate(&request)?;

    println!("Assigned variant: {:?}", result.variant_key);

    client.shutdown()?;

    Ok(())
}
