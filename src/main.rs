use anyhow::Result;

fn main() -> Result<()> {
    stockflow::run(stockflow::AppConfig::default())?;
    Ok(())
}
