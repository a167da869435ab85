use tabled::Tabled;

#[derive(Tabled)]
pub struct TrendRow {
    pub metric: String,
    pub count: u64,
    #[tabled(display = "float2")]
    pub avg_ms: f64,
    #[tabled(display = "float2")]
    pub min_ms: f64,
    #[tabled(display = "float2")]
    pub p50_ms: f64,
    #[tabled(display = "float2")]
    pub p95_ms: f64,
    #[tabled(display = "float2")]
    pub p99_ms: f64,
    #[tabled(display = "float2")]
    pub max_ms: f64,
}

#[derive(Tabled)]
pub struct RateRow {
    pub metric: String,
    pub total: u64,
    pub occurred: u64,
    #[tabled(display = "float2")]
    pub rate_percent: f64,
}

#[derive(Tabled)]
pub struct ThresholdRow {
    pub metric: String,
    pub predicate: String,
    pub result: String,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}
