use plx::Aggregator;

pub fn run(aggregator: &Aggregator) {
    println!("Supported platforms:");
    for platform in aggregator.supported_platforms() {
        let note = match aggregator.streaming_platform(platform) {
            Some(adapter) if adapter.requires_access_token() => "requires 'plx auth' to write",
            Some(_) => "no authorization needed",
            None => "not available",
        };
        println!("  {:<12} {}", platform.as_str(), note);
    }
}
