//! Diner load generator
//!
//! Seeds the directory with a small batch of restaurants, rates them, times
//! a burst of GET requests against one path, and cleans up afterwards.

mod generator;
mod report;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use generator::{NewRestaurant, Rating};
use report::LatencySummary;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "diner-loadgen")]
#[command(about = "Load generator for the Diner API")]
#[command(version)]
struct Args {
    /// Base URL of the API
    #[arg(short, long, env = "DINER_ENDPOINT", default_value = "http://localhost:80")]
    endpoint: String,

    /// Restaurants to create per cuisine
    #[arg(long, default_value = "1")]
    per_cuisine: usize,

    /// Timed GET requests to issue
    #[arg(short = 'n', long, default_value = "100")]
    requests: usize,

    /// Timed requests in flight at once
    #[arg(short, long, default_value = "10")]
    concurrency: usize,

    /// Path the timed requests hit
    #[arg(long, default_value = "/")]
    path: String,

    /// Leave the created restaurants in place
    #[arg(long, default_value_t = false)]
    keep: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "10")]
    timeout_secs: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Thin client over the Diner HTTP API
struct Api {
    client: reqwest::Client,
    base: String,
}

impl Api {
    fn new(base: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(usize::MAX)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base)
        } else {
            format!("{}/{path}", self.base)
        }
    }

    /// Returns `false` if the name was already taken
    async fn create(&self, restaurant: &NewRestaurant) -> Result<bool> {
        let resp = self
            .client
            .post(self.url("/restaurants"))
            .json(restaurant)
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            s => bail!("creating {} failed with {}", restaurant.name, s),
        }
    }

    async fn rate(&self, name: &str, rating: f64) -> Result<()> {
        self.client
            .post(self.url("/restaurants/rating"))
            .json(&Rating { name, rating })
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("rating {name}"))?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.client
            .delete(self.url(&format!("/restaurants/{name}")))
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("deleting {name}"))?;
        Ok(())
    }

    /// Latency of one GET and whether it succeeded
    async fn timed_get(&self, url: &str) -> (Duration, bool) {
        let start = Instant::now();
        let ok = match self.client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.bytes().await;
                if !status.is_success() {
                    debug!("GET {} answered {}", url, status);
                }
                status.is_success() && body.is_ok()
            }
            Err(e) => {
                debug!("GET {} failed: {}", url, e);
                false
            }
        };
        (start.elapsed(), ok)
    }
}

async fn seed(
    api: &Api,
    fixtures: &[NewRestaurant],
    ratings: &[f64],
    created: &mut Vec<String>,
) -> Result<()> {
    for restaurant in fixtures {
        if api.create(restaurant).await? {
            info!("Created restaurant: {}", restaurant.name);
            created.push(restaurant.name.clone());
        } else {
            warn!("Restaurant {} already exists, leaving it alone", restaurant.name);
        }
    }
    info!("Created {} restaurants", created.len());

    for Rating { name, rating } in generator::rating_plan(fixtures, ratings, created) {
        api.rate(name, rating).await?;
        info!("Rated restaurant {} with rating: {}", name, rating);
    }
    Ok(())
}

async fn measure(api: &Api, args: &Args) -> LatencySummary {
    let url = api.url(&args.path);
    info!(
        "Issuing {} GET {} requests, {} at a time",
        args.requests, url, args.concurrency
    );

    let results: Vec<(Duration, bool)> = futures::stream::iter(0..args.requests)
        .map(|_| api.timed_get(&url))
        .buffer_unordered(args.concurrency.max(1))
        .collect()
        .await;

    let errors = results.iter().filter(|(_, ok)| !ok).count();
    let samples = results
        .into_iter()
        .filter_map(|(latency, ok)| ok.then_some(latency))
        .collect();
    LatencySummary::from_samples(samples, errors)
}

async fn cleanup(api: &Api, created: &[String]) {
    let mut failed = 0;
    for name in created {
        match api.delete(name).await {
            Ok(()) => info!("Deleted restaurant: {}", name),
            Err(e) => {
                error!("{:#}", e);
                failed += 1;
            }
        }
    }
    if failed == 0 {
        info!("All restaurants deleted");
    } else {
        warn!("{} restaurants could not be deleted", failed);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let api = Api::new(&args.endpoint, Duration::from_secs(args.timeout_secs))?;

    let (fixtures, ratings) = {
        let mut rng = rand::thread_rng();
        let fixtures = generator::restaurants(&mut rng, args.per_cuisine);
        let ratings: Vec<f64> = fixtures
            .iter()
            .map(|_| generator::random_rating(&mut rng))
            .collect();
        (fixtures, ratings)
    };

    let mut created = Vec::new();
    let outcome = match seed(&api, &fixtures, &ratings, &mut created).await {
        Ok(()) => Ok(measure(&api, &args).await),
        Err(e) => Err(e),
    };

    if args.keep {
        info!("Keeping {} restaurants", created.len());
    } else {
        cleanup(&api, &created).await;
    }

    let summary = outcome.context("seeding restaurants")?;
    info!("Latency: {}", summary);
    println!("{summary}");
    Ok(())
}
