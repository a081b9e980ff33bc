use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
pub struct Args {
    /// CSV with `id,name,ipaddress` columns
    #[arg(long)]
    pub devices: PathBuf,

    /// CSV with `id,location,type,pin,piid` columns
    #[arg(long)]
    pub sensors: PathBuf,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,
}
