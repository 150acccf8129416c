use clap::{Parser, Subcommand};
use reqwest::Method;
use url::Url;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Cache purge tool for the translating proxy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evict one URL: the original, or only the --lang variant when given
    Purge {
        url: String,
        #[arg(short, long)]
        lang: Option<String>,
    },
    /// Flush the whole cache through the given proxy base URL
    PurgeAll {
        base_url: String,
        #[arg(long, default_value = "page=all")]
        marker: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let target = match cli.command {
        Commands::Purge { url, lang } => {
            let mut url = Url::parse(&url)?;
            if let Some(lang) = lang {
                url.query_pairs_mut().append_pair("lang", &lang);
            }
            url
        }
        Commands::PurgeAll { base_url, marker } => {
            let mut url = Url::parse(&base_url)?;
            url.set_query(Some(&marker));
            url
        }
    };

    let purge = Method::from_bytes(b"PURGE")?;
    let res = reqwest::Client::new().request(purge, target).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let body = res.text().await?;
    if status.is_success() {
        println!("{}", status);
        println!("{}", body.trim_end());
    } else {
        eprintln!("Error: proxy returned status {}", status);
        eprintln!("Response: {}", body.trim_end());
    }
    Ok(())
}
