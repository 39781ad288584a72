use stress_test::{stress_test_chatter, stress_test_replies, stress_test_scaling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if !rt.block_on(async_main()) {
        std::process::exit(1);
    }
}

async fn async_main() -> bool {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            CAUSAL DELIVERY STRESS TESTS                     ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let runs = [
        // Independent chatter on a fast bus
        stress_test_chatter(3, 100, 0, 0.0).await,
        // Independent chatter with jitter and duplicates
        stress_test_chatter(5, 100, 20, 0.2).await,
        // Reply chains on a jittery bus
        stress_test_replies(4, 200, 20, 0.1).await,
        stress_test_replies(10, 500, 10, 0.1).await,
    ];

    let mut all_ok = true;
    for stats in &runs {
        stats.print();
        all_ok &= stats.passed();
    }

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS (Reply chains)                   ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    all_ok &= stress_test_scaling(12, 3).await;

    if all_ok {
        println!("\n✓ All stress tests completed successfully!");
    } else {
        println!("\n✗ Some stress tests violated causal order or did not converge");
    }
    all_ok
}
