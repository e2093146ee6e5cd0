//! histindex - command-line front end for HistIndex research-note databases
//!
//! Records quotes from books, articles and primary sources, tags them with
//! keywords, and searches or exports them.

mod settings;

use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use histindex_core::{
    export_quotes, group_quotes, Author, Book, Entity, ExportContext, ExportFormat,
    HistIndexError, Keyword, Library, Quote, QuoteFilter, Source,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::settings::AppSettings;

/// Environment variable that overrides the configured log filter.
const LOG_ENV: &str = "HISTINDEX_LOG";

/// histindex - research-note manager
#[derive(Parser)]
#[command(name = "histindex")]
#[command(version)]
#[command(about = "Record, tag and search quotes from books and primary sources", long_about = None)]
struct Cli {
    /// Database file to use instead of the configured one
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Print records as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty database
    Init {
        /// Replace the HistIndex tables of an existing file
        #[arg(long)]
        force: bool,
    },

    /// Manage authors
    #[command(subcommand)]
    Author(AuthorCommand),

    /// Manage books and articles
    #[command(subcommand)]
    Book(BookCommand),

    /// Manage primary sources
    #[command(subcommand)]
    Source(SourceCommand),

    /// Manage keywords
    #[command(subcommand)]
    Keyword(KeywordCommand),

    /// Manage quotes
    #[command(subcommand)]
    Quote(QuoteCommand),

    /// Search quotes, optionally exporting the results
    Search(SearchArgs),

    /// Show or change settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum AuthorCommand {
    /// Add an author
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        last_name: String,
    },
    /// Change an author's names
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    /// List authors by last name
    List,
    /// Delete an author and unlink it from its books
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum BookCommand {
    /// Add a book or article
    Add {
        #[arg(long)]
        title: String,
        /// Author id (repeat for several authors)
        #[arg(long = "author", required = true)]
        authors: Vec<i64>,
    },
    /// Change a book's title or replace its authors
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        /// Author id (repeat for several authors); replaces the current authors
        #[arg(long = "author")]
        authors: Vec<i64>,
    },
    /// List books by description
    List,
    /// Delete a book together with its quotes
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum SourceCommand {
    /// Add a primary source
    Add {
        #[arg(long)]
        title: String,
        /// Archive reference or other details
        #[arg(long)]
        extra_info: Option<String>,
    },
    /// Change a source's title or details
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        /// Archive reference or other details; an empty value clears them
        #[arg(long)]
        extra_info: Option<String>,
    },
    /// List sources by title
    List,
    /// Delete a source together with its quotes
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum KeywordCommand {
    /// Add a keyword
    Add { name: String },
    /// Rename a keyword
    Edit {
        id: i64,
        #[arg(long)]
        name: String,
    },
    /// List keywords by name
    List,
    /// Delete a keyword and remove it from every quote
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum QuoteCommand {
    /// Add a quote from a book or a source
    Add {
        #[arg(long)]
        text: String,
        /// Book id
        #[arg(long, conflicts_with = "source")]
        book: Option<i64>,
        /// Source id
        #[arg(long)]
        source: Option<i64>,
        #[arg(long, default_value = "")]
        page: String,
        #[arg(long)]
        comment: Option<String>,
        /// Keyword id (repeat for several keywords)
        #[arg(long = "keyword")]
        keywords: Vec<i64>,
    },
    /// Change a quote; options that are not given keep their value
    Edit {
        id: i64,
        #[arg(long)]
        text: Option<String>,
        /// Move the quote to this book
        #[arg(long, conflicts_with = "source")]
        book: Option<i64>,
        /// Move the quote to this source
        #[arg(long)]
        source: Option<i64>,
        #[arg(long)]
        page: Option<String>,
        /// An empty value removes the comment
        #[arg(long)]
        comment: Option<String>,
        /// Keyword id (repeat for several keywords); replaces the current keywords
        #[arg(long = "keyword")]
        keywords: Vec<i64>,
        /// Remove every keyword from the quote
        #[arg(long, conflicts_with = "keywords")]
        no_keywords: bool,
    },
    /// List every quote, grouped by origin
    List,
    /// Show one quote
    Show { id: i64 },
    /// Delete a quote
    Delete { id: i64 },
}

#[derive(Args)]
struct SearchArgs {
    /// Keyword id; quotes with any of the given keywords match
    #[arg(long = "keyword")]
    keywords: Vec<i64>,

    /// Book id; quotes from any of the given books match
    #[arg(long = "book")]
    books: Vec<i64>,

    /// Author id; quotes from books by any of the given authors match
    #[arg(long = "author")]
    authors: Vec<i64>,

    /// Source id; quotes from any of the given sources match
    #[arg(long = "source")]
    sources: Vec<i64>,

    /// Text the quote must contain
    #[arg(short, long)]
    text: Option<String>,

    /// Write a report instead of listing the results (csv or json)
    #[arg(short, long)]
    export: Option<ExportFormat>,

    /// Report file (defaults to standard output)
    #[arg(short, long, requires = "export")]
    output: Option<PathBuf>,
}

impl SearchArgs {
    fn filter(&self) -> QuoteFilter {
        QuoteFilter {
            keywords: self.keywords.clone(),
            books: self.books.clone(),
            authors: self.authors.clone(),
            sources: self.sources.clone(),
            text: self.text.clone(),
        }
    }
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current settings
    Show,
    /// Set the database used when --database is not given
    SetDatabase { path: PathBuf },
    /// Set the default log filter (e.g. "info", "debug", "histindex_core=debug")
    SetLogLevel { level: String },
}

fn main() {
    let cli = Cli::parse();
    let settings = settings::load_settings();
    init_logging(&settings.log_level);

    if let Err(err) = run(cli, settings) {
        eprintln!("{}", error_line(&err));
        tracing::debug!("{err:?}");
        std::process::exit(1);
    }
}

/// The line printed before exiting with status 1. Library errors show their
/// short user message; anything else shows the full context chain.
fn error_line(err: &anyhow::Error) -> String {
    match err.downcast_ref::<HistIndexError>() {
        Some(core) => format!("Error: {}", core.user_message()),
        None => format!("Error: {err:#}"),
    }
}

/// Installs the fmt subscriber; `log` records from the core library are
/// forwarded to it as well.
fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn run(cli: Cli, settings: AppSettings) -> Result<()> {
    let database = cli
        .database
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.database_path));

    match cli.command {
        Commands::Init { force } => init_database(&database, force),
        Commands::Config(command) => run_config(command, settings),
        Commands::Author(command) => run_author(&mut open_library(&database)?, command, cli.json),
        Commands::Book(command) => run_book(&mut open_library(&database)?, command, cli.json),
        Commands::Source(command) => run_source(&mut open_library(&database)?, command, cli.json),
        Commands::Keyword(command) => run_keyword(&mut open_library(&database)?, command, cli.json),
        Commands::Quote(command) => run_quote(&mut open_library(&database)?, command, cli.json),
        Commands::Search(args) => run_search(&open_library(&database)?, &args, cli.json),
    }
}

fn open_library(path: &Path) -> Result<Library> {
    if !path.exists() {
        bail!(
            "No database at {}; run `histindex init` or pass --database",
            path.display()
        );
    }
    let library = Library::open(path)?;
    info!("Opened {}", path.display());
    Ok(library)
}

fn init_database(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to replace its HistIndex tables",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let library = Library::create(path)?;
    println!("Created \"{}\" at {}", library.title(), path.display());
    Ok(())
}

// ── Entity commands ────────────────────────────────────────────────

fn run_author(library: &mut Library, command: AuthorCommand, json: bool) -> Result<()> {
    match command {
        AuthorCommand::Add { name, last_name } => {
            let mut author = Author::new(name, last_name);
            library.save_author(&mut author)?;
            print_saved("Added", &author, json)
        }
        AuthorCommand::Edit {
            id,
            name,
            last_name,
        } => {
            let mut author = library.get_author(id)?;
            if let Some(name) = name {
                author.name = name;
            }
            if let Some(last_name) = last_name {
                author.last_name = last_name;
            }
            library.save_author(&mut author)?;
            print_saved("Updated", &author, json)
        }
        AuthorCommand::List => print_list(&library.list_authors()?, json),
        AuthorCommand::Delete { id } => {
            library.delete_author(id)?;
            println!("Deleted author {id}");
            Ok(())
        }
    }
}

fn run_book(library: &mut Library, command: BookCommand, json: bool) -> Result<()> {
    match command {
        BookCommand::Add { title, authors } => {
            let mut book = Book::new(title);
            for id in authors {
                book.add_author(library.get_author(id)?);
            }
            library.save_book(&mut book)?;
            print_saved("Added", &book, json)
        }
        BookCommand::Edit { id, title, authors } => {
            let mut book = library.get_book(id)?;
            if let Some(title) = title {
                book.title = title;
            }
            if !authors.is_empty() {
                book.clear_authors();
                for id in authors {
                    book.add_author(library.get_author(id)?);
                }
            }
            library.save_book(&mut book)?;
            print_saved("Updated", &book, json)
        }
        BookCommand::List => print_list(&library.list_books()?, json),
        BookCommand::Delete { id } => {
            library.delete_book(id)?;
            println!("Deleted book {id} and its quotes");
            Ok(())
        }
    }
}

fn run_source(library: &mut Library, command: SourceCommand, json: bool) -> Result<()> {
    match command {
        SourceCommand::Add { title, extra_info } => {
            let mut source = Source::new(title);
            source.extra_info = extra_info.filter(|info| !info.trim().is_empty());
            library.save_source(&mut source)?;
            print_saved("Added", &source, json)
        }
        SourceCommand::Edit {
            id,
            title,
            extra_info,
        } => {
            let mut source = library.get_source(id)?;
            if let Some(title) = title {
                source.title = title;
            }
            if let Some(info) = extra_info {
                source.extra_info = Some(info).filter(|info| !info.trim().is_empty());
            }
            library.save_source(&mut source)?;
            print_saved("Updated", &source, json)
        }
        SourceCommand::List => print_list(&library.list_sources()?, json),
        SourceCommand::Delete { id } => {
            library.delete_source(id)?;
            println!("Deleted source {id} and its quotes");
            Ok(())
        }
    }
}

fn run_keyword(library: &mut Library, command: KeywordCommand, json: bool) -> Result<()> {
    match command {
        KeywordCommand::Add { name } => {
            let mut keyword = Keyword::new(name);
            library.save_keyword(&mut keyword)?;
            print_saved("Added", &keyword, json)
        }
        KeywordCommand::Edit { id, name } => {
            let mut keyword = library.get_keyword(id)?;
            keyword.name = name;
            library.save_keyword(&mut keyword)?;
            print_saved("Updated", &keyword, json)
        }
        KeywordCommand::List => print_list(&library.list_keywords()?, json),
        KeywordCommand::Delete { id } => {
            library.delete_keyword(id)?;
            println!("Deleted keyword {id}");
            Ok(())
        }
    }
}

fn run_quote(library: &mut Library, command: QuoteCommand, json: bool) -> Result<()> {
    match command {
        QuoteCommand::Add {
            text,
            book,
            source,
            page,
            comment,
            keywords,
        } => {
            let mut quote = Quote::new(text);
            quote.set_book_id(book);
            quote.set_source_id(source);
            quote.page = page.trim().to_string();
            quote.comment = comment.filter(|c| !c.trim().is_empty());
            for id in keywords {
                quote.keywords.push(library.get_keyword(id)?);
            }
            library.save_quote(&mut quote)?;
            println!("Added quote {}", quote.id);
            Ok(())
        }
        QuoteCommand::Edit {
            id,
            text,
            book,
            source,
            page,
            comment,
            keywords,
            no_keywords,
        } => {
            let mut quote = library.get_quote(id)?;
            if let Some(text) = text {
                quote.text = text;
            }
            if book.is_some() {
                quote.set_source(None);
                quote.set_book_id(book);
            }
            if source.is_some() {
                quote.set_book(None);
                quote.set_source_id(source);
            }
            if let Some(page) = page {
                quote.page = page.trim().to_string();
            }
            if let Some(comment) = comment {
                quote.comment = Some(comment).filter(|c| !c.trim().is_empty());
            }
            if no_keywords || !keywords.is_empty() {
                quote.keywords.clear();
                for id in keywords {
                    quote.keywords.push(library.get_keyword(id)?);
                }
            }
            library.save_quote(&mut quote)?;
            println!("Updated quote {}", quote.id);
            Ok(())
        }
        QuoteCommand::List => print_quotes(&library.list_quotes()?, json),
        QuoteCommand::Show { id } => {
            let quote = library.get_quote(id)?;
            if json {
                return print_json(&quote);
            }
            println!("Quote {}", quote.id);
            println!("From:      {}", quote.where_description());
            println!("Page:      {}", display_page(&quote));
            println!("Keywords:  {}", display_keywords(&quote));
            if let Some(comment) = quote.comment_text() {
                println!("Comment:   {comment}");
            }
            println!();
            println!("{}", quote.text);
            Ok(())
        }
        QuoteCommand::Delete { id } => {
            library.delete_quote(id)?;
            println!("Deleted quote {id}");
            Ok(())
        }
    }
}

// ── Search ─────────────────────────────────────────────────────────

fn run_search(library: &Library, args: &SearchArgs, json: bool) -> Result<()> {
    let filter = args.filter();
    let quotes = library.search_quotes(&filter)?;
    info!("Search matched {} quote(s)", quotes.len());

    let format = match (args.export, json) {
        (Some(format), _) => format,
        (None, true) => ExportFormat::Json,
        (None, false) => {
            if quotes.is_empty() {
                println!("No quotes found");
                return Ok(());
            }
            return print_quotes(&quotes, false);
        }
    };

    let context = ExportContext::new(library.filename(), library.describe_filter(&filter)?);
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            export_quotes(BufWriter::new(file), &context, &quotes, format)?;
            println!("Exported {} quote(s) to {}", quotes.len(), path.display());
        }
        None => export_quotes(io::stdout().lock(), &context, &quotes, format)?,
    }
    Ok(())
}

// ── Settings ───────────────────────────────────────────────────────

fn run_config(command: ConfigCommand, mut settings: AppSettings) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            println!("HistIndex Configuration");
            println!("=======================");
            println!("Settings file:  {}", settings::settings_file_path().display());
            println!("Database:       {}", settings.database_path);
            println!("Log level:      {}", settings.log_level);
            return Ok(());
        }
        ConfigCommand::SetDatabase { path } => {
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()?.join(path)
            };
            settings.database_path = path.to_string_lossy().to_string();
            println!("Database set to: {}", settings.database_path);
        }
        ConfigCommand::SetLogLevel { level } => {
            EnvFilter::try_new(&level)
                .with_context(|| format!("Invalid log level: {level}"))?;
            settings.log_level = level;
            println!("Log level set to: {}", settings.log_level);
        }
    }
    settings::save_settings(&settings).map_err(anyhow::Error::msg)?;
    info!("Saved settings to {}", settings::settings_file_path().display());
    Ok(())
}

// ── Output ─────────────────────────────────────────────────────────

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_saved<T: Entity + Serialize + Display>(action: &str, entity: &T, json: bool) -> Result<()> {
    if json {
        return print_json(entity);
    }
    println!("{action} {} {}: {}", T::ENTITY_NAME.to_lowercase(), entity.id(), entity);
    Ok(())
}

fn print_list<T: Entity + Serialize + Display>(entities: &[T], json: bool) -> Result<()> {
    if json {
        return print_json(entities);
    }
    let mut out = io::stdout().lock();
    for entity in entities {
        writeln!(out, "{:>6}  {}", entity.id(), entity)?;
    }
    Ok(())
}

fn display_page(quote: &Quote) -> &str {
    if quote.page.trim().is_empty() {
        "Undefined"
    } else {
        quote.page.trim()
    }
}

fn display_keywords(quote: &Quote) -> String {
    if quote.keywords.is_empty() {
        "None".to_string()
    } else {
        quote.keywords_display()
    }
}

/// Lists quotes under a heading for each book or source.
fn print_quotes(quotes: &[Quote], json: bool) -> Result<()> {
    if json {
        return print_json(quotes);
    }
    let mut out = io::stdout().lock();
    for (idx, group) in group_quotes(quotes).iter().enumerate() {
        if idx > 0 {
            writeln!(out)?;
        }
        writeln!(out, "{}", group.where_description)?;
        for quote in &group.quotes {
            writeln!(out, "{:>6}  p. {:<9} {}", quote.id, quote.page_cell(), quote.text_cell())?;
            writeln!(out, "        [{}]", quote.keywords_cell())?;
        }
    }
    Ok(())
}
