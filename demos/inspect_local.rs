use std::sync::Mutex;

use error_sentinel::{
    InspectionHooks,
    InspectionSurface,
    Observation,
    Sentinel,
    SentinelConfig,
};
use tracing_subscriber::EnvFilter;

/// Terminal stand-in for an on-screen error panel.
#[derive(Default)]
struct ConsolePanel {
    hooks: Mutex<Option<InspectionHooks>>,
}

impl InspectionSurface for ConsolePanel {
    fn attach(&self, hooks: InspectionHooks) {
        *self.hooks.lock().unwrap() = Some(hooks);
    }
}

impl ConsolePanel {
    fn hooks(&self) -> InspectionHooks {
        self.hooks.lock().unwrap().clone().expect("panel attached")
    }

    async fn render(&self) {
        let errors = self.hooks().refresh().await;
        println!("{} tracked error(s)", errors.len());
        for error in &errors {
            println!(
                "  [{}] {} {} -> {}",
                error.team, error.method, error.endpoint, error.status_code
            );
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = SentinelConfig::builder()
        .with_rule("https://app.example.[tld]/api", "frontend")
        .with_origin("https://app.example.com")
        .with_max_local_errors(3)
        .build()
        .expect("valid configuration");

    let sentinel = Sentinel::new(config).expect("engine starts");
    let panel = ConsolePanel::default();
    sentinel.attach_surface(&panel);

    for id in 0..5 {
        sentinel.report(Observation::new(format!("/api/items/{}", id), "GET", 503));
    }
    panel.render().await;

    println!("{}", sentinel.export_local_errors().await.expect("local store readable"));

    panel.hooks().clear().await;
    panel.render().await;

    sentinel.destroy();
}
