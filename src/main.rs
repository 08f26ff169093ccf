use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use baby_naming::{
    compute_from_str, db, open_database, page, CharacterLibrary, Element, GenderTendency,
    LibraryQuery,
};

#[derive(Parser)]
#[command(name = "baby-naming")]
#[command(about = "Bazi charts, character library and naming history from the command line")]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "NAMING_DB_PATH", default_value = "naming.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Four Pillars and five-element profile for a birth date
    Bazi {
        /// YYYY-MM-DD, YYYY/MM/DD, YYYY.MM.DD or an ISO datetime
        date: String,

        /// Birth hour (0-23)
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=23))]
        hour: Option<u32>,

        /// Print JSON instead of the human summary
        #[arg(long)]
        json: bool,
    },

    /// Search the character library
    Characters {
        #[arg(long)]
        pinyin: Option<String>,
        #[arg(long)]
        radical: Option<String>,
        /// 金木水火土 or metal/wood/water/fire/earth
        #[arg(long)]
        wuxing: Option<String>,
        #[arg(long, value_parser = parse_gender)]
        gender: Option<GenderTendency>,
        /// modern, classical or poetic
        #[arg(long)]
        style: Option<String>,
        #[arg(long)]
        min_strokes: Option<u32>,
        #[arg(long)]
        max_strokes: Option<u32>,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        page_size: Option<usize>,
        /// Replacement CSV instead of the built-in table
        #[arg(long)]
        library: Option<PathBuf>,
    },

    /// Naming history of a user, newest first
    History {
        openid: String,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Create the database schema
    InitDb,
}

fn parse_gender(s: &str) -> Result<GenderTendency, String> {
    match s.to_lowercase().as_str() {
        "male" | "m" | "男" => Ok(GenderTendency::Male),
        "female" | "f" | "女" => Ok(GenderTendency::Female),
        "neutral" | "n" | "中性" => Ok(GenderTendency::Neutral),
        other => Err(format!("unknown gender {:?} (male/female/neutral)", other)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Bazi { date, hour, json } => run_bazi(&date, hour, json),
        Command::Characters {
            pinyin,
            radical,
            wuxing,
            gender,
            style,
            min_strokes,
            max_strokes,
            page,
            page_size,
            library,
        } => {
            let query = LibraryQuery {
                pinyin,
                radical,
                wuxing,
                gender,
                style,
                min_strokes,
                max_strokes,
                page,
                page_size,
            };
            run_characters(&query, library)
        }
        Command::History {
            openid,
            page,
            page_size,
        } => run_history(&cli.db, &openid, page, page_size),
        Command::InitDb => run_init_db(&cli.db),
    }
}

fn run_bazi(date: &str, hour: Option<u32>, json: bool) -> Result<()> {
    let result = compute_from_str(date, hour)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("🔮 Bazi Chart - {}", date);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   年柱  {}", result.year);
    println!("   月柱  {}", result.month);
    println!("   日柱  {}", result.day);
    if result.hour_known {
        println!("   时柱  {}", result.hour);
    } else {
        println!("   时柱  {} (时辰未知，不计入五行)", result.hour);
    }

    let profile = &result.profile;
    println!("\n🌿 五行 ({} 个):", profile.total());
    for element in Element::ALL {
        let count = profile.count(element);
        println!("   {} {:<2} {}", element.symbol(), count, "●".repeat(count as usize));
    }

    println!("\n✓ {}", profile.summary_label);
    println!("   {}", profile.explanation);

    Ok(())
}

fn run_characters(query: &LibraryQuery, library: Option<PathBuf>) -> Result<()> {
    let owned;
    let lib = match library {
        Some(path) => {
            owned = CharacterLibrary::from_path(&path)?;
            &owned
        }
        None => CharacterLibrary::builtin()?,
    };

    let found = lib.search(query);
    println!(
        "📚 {} matching characters (page {}, {} per page)",
        found.total, found.page, found.page_size
    );
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for entry in &found.records {
        println!(
            "   {}  {:<6} {:>2}画  {}  {}  {}",
            entry.char,
            entry.pinyin,
            entry.strokes,
            entry.wuxing,
            entry.radical,
            entry.meaning
        );
    }

    if found.has_more {
        println!("\n   … more on page {}", found.page + 1);
    }

    Ok(())
}

fn run_history(db_path: &Path, openid: &str, page_no: Option<usize>, page_size: Option<usize>) -> Result<()> {
    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: baby-naming init-db");
        std::process::exit(1);
    }

    let conn = open_database(db_path)?;
    let (page_no, size) = page::normalize(page_no, page_size, page::DEFAULT_PAGE_SIZE);
    let history = db::list_history(&conn, openid, page_no, size, Utc::now())
        .with_context(|| format!("Failed to load history for {}", openid))?;

    println!("📜 Naming history for {} ({} records)", openid, history.total);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for entry in &history.records {
        let surname = entry.params["surname"].as_str().unwrap_or("?");
        let names: Vec<&str> = entry.result["names"]
            .as_array()
            .map(|names| names.iter().filter_map(|n| n["fullName"].as_str()).collect())
            .unwrap_or_default();

        println!("   [{}] {}  姓{}  → {}", entry.created_at, entry.id, surname, names.join("、"));
    }

    Ok(())
}

fn run_init_db(db_path: &Path) -> Result<()> {
    println!("🗄️  Setting up database...");
    open_database(db_path)?;
    println!("✓ Database initialized with WAL mode: {:?}", db_path);
    Ok(())
}
