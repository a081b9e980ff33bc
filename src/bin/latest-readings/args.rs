use clap::Parser;

#[derive(Debug, Parser)]
pub struct Args {
    /// Print every reading from the last N days instead of the latest per sensor
    #[arg(long)]
    pub days: Option<i64>,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,
}
