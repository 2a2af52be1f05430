use clap::Parser;

use hashlease::{api, cli, orders};

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Serve { host, port, data_dir } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(api::serve(&host, port, &data_dir))
        }
        cli::Command::GenCode { data_dir } => gen_code(&data_dir),
    }
}

fn gen_code(data_dir: &std::path::Path) -> anyhow::Result<()> {
    let data_dir = if data_dir.starts_with("~") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        std::path::PathBuf::from(home).join(data_dir.strip_prefix("~").unwrap())
    } else {
        data_dir.to_path_buf()
    };
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("hashlease.db");
    let (db, _secret) = api::db::open(&db_path)?;

    let rt = tokio::runtime::Runtime::new()?;
    let code = rt.block_on(async {
        let conn = db.lock().await;
        orders::code::generate_order_code(&conn)
    })?;

    println!("{code}");
    Ok(())
}
