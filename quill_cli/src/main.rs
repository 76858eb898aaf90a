mod store;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use quill_backend::blog::{BlogError, BlogService, NewComment, PostQuery, SignUpInput, ToggleKind};
use quill_backend::config::UpstreamConfig;
use quill_backend::models::{Post, PostPage};
use quill_backend::session::Session;
use quill_backend::telemetry;
use quill_backend::thread;
use quill_backend::upstream::UpstreamClient;
use quill_backend::utils::relative_time;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use store::FileTokenStore;

#[derive(Parser)]
#[command(name = "quill", author, version, about = "Terminal client for the Quill blog")]
struct Cli {
    /// Blog API base URL
    #[arg(long, env = "QUILL_UPSTREAM_URL", default_value = "http://127.0.0.1:8000")]
    upstream: String,
    /// Session file, defaults to the platform config directory
    #[arg(long, env = "QUILL_SESSION_FILE")]
    session_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and remember the session
    Login { username: String, password: String },
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        full_name: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List posts
    Posts {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        search: Option<String>,
        /// Numeric id of the author (the upstream filters by id, not username)
        #[arg(long, value_parser = clap::value_parser!(u64))]
        author: Option<u64>,
    },
    /// Show a post with its comments
    Show { post: String },
    /// Comment on a post, or reply to a comment
    Comment {
        post: String,
        text: String,
        #[arg(long)]
        reply_to: Option<String>,
    },
    /// Toggle a like
    Like { post: String },
    /// Toggle a bookmark
    Bookmark { post: String },
    /// Toggle a repost
    Repost { post: String },
    /// Like a comment
    LikeComment { comment: String },
    /// Delete one of your posts
    DeletePost { post: String },
    /// Delete one of your comments
    DeleteComment { comment: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_tracing_with_default("warn");
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            if matches!(err.downcast_ref::<BlogError>(), Some(BlogError::Unauthenticated)) {
                eprintln!("hint: run `quill login <username> <password>` first");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = match cli.session_file {
        Some(path) => path,
        None => store::default_session_path()?,
    };
    let store = Arc::new(FileTokenStore::load(path)?);
    let upstream = UpstreamClient::new(&UpstreamConfig::new(&cli.upstream)?)?;
    let session = Session::new(store.clone(), upstream);
    let blog = BlogService::new(&session);

    match cli.command {
        Command::Login { username, password } => {
            let user = blog.sign_in(&username, &password).await?;
            store.ensure_saved()?;
            println!("Signed in as {} (@{})", user.display_name(), user.username);
        }
        Command::Signup {
            email,
            username,
            password,
            full_name,
        } => {
            blog.sign_up(&SignUpInput {
                email,
                username: username.clone(),
                password,
                full_name,
            })
            .await?;
            store.ensure_saved()?;
            println!("Account @{username} created, you are signed in");
        }
        Command::Logout => {
            blog.sign_out();
            store.ensure_saved()?;
            println!("Signed out ({} removed)", store.path().display());
        }
        Command::Whoami => {
            let user = blog.current_user().await?;
            println!("{} (@{})", user.display_name(), user.username);
            if let Some(email) = user.email.as_deref() {
                println!("  {email}");
            }
            if let Some(bio) = user.bio.as_deref().filter(|bio| !bio.is_empty()) {
                println!("  {bio}");
            }
        }
        Command::Posts {
            page,
            search,
            author,
        } => {
            let query = PostQuery {
                page: Some(page),
                page_size: None,
                author: author.map(|id| id.to_string()),
                search,
            };
            print_page(&blog.list_posts(&query).await?);
        }
        Command::Show { post } => {
            let found = blog.get_post(&post).await?;
            print_post(&found);
            print_comments(&blog, &post).await?;
        }
        Command::Comment {
            post,
            text,
            reply_to,
        } => {
            let comment = blog
                .add_comment(
                    &post,
                    &NewComment {
                        content: text,
                        parent_id: reply_to,
                    },
                )
                .await?;
            println!("Posted comment #{}", comment.id);
            print_comments(&blog, &post).await?;
        }
        Command::Like { post } => toggle(&blog, &post, ToggleKind::Like).await?,
        Command::Bookmark { post } => toggle(&blog, &post, ToggleKind::Bookmark).await?,
        Command::Repost { post } => toggle(&blog, &post, ToggleKind::Repost).await?,
        Command::LikeComment { comment } => {
            if blog.like_comment(&comment).await? {
                println!("Liked comment #{comment}");
            } else {
                println!("Comment #{comment} was already liked");
            }
        }
        Command::DeletePost { post } => {
            blog.delete_post(&post).await?;
            println!("Deleted post {post}");
        }
        Command::DeleteComment { comment } => {
            blog.delete_comment(&comment).await?;
            println!("Deleted comment #{comment}");
        }
    }
    // A refresh during the command may have rotated tokens.
    store.ensure_saved()
}

async fn toggle(blog: &BlogService<'_>, post: &str, kind: ToggleKind) -> Result<()> {
    let outcome = blog.toggle(post, kind).await?;
    let verb = match (kind, outcome.active) {
        (ToggleKind::Like, true) => "Liked",
        (ToggleKind::Like, false) => "Unliked",
        (ToggleKind::Bookmark, true) => "Bookmarked",
        (ToggleKind::Bookmark, false) => "Removed bookmark from",
        (ToggleKind::Repost, true) => "Reposted",
        (ToggleKind::Repost, false) => "Removed repost of",
    };
    println!("{verb} post {post}");
    Ok(())
}

fn print_page(page: &PostPage) {
    let now = Utc::now();
    if page.posts.is_empty() {
        println!("No posts.");
    }
    for post in &page.posts {
        let when = post
            .created_at
            .as_deref()
            .map(|raw| relative_time(raw, now))
            .unwrap_or_default();
        println!(
            "#{} {} by @{} {} [{} likes, {} comments]",
            post.id, post.title, post.author.username, when, post.likes_count, post.comments_count
        );
    }
    let p = &page.pagination;
    println!("page {}/{} ({} posts)", p.page, p.total_pages.max(1), p.total);
}

fn print_post(post: &Post) {
    let when = post
        .created_at
        .as_deref()
        .map(|raw| relative_time(raw, Utc::now()))
        .unwrap_or_default();
    println!("{}", post.title);
    println!("by {} (@{}) {when}", post.author.display_name(), post.author.username);
    if !post.tags.is_empty() {
        println!("tags: {}", post.tags.join(", "));
    }
    println!();
    println!("{}", post.content);
    println!();
    println!(
        "{} likes, {} bookmarks, {} reposts",
        post.likes_count, post.bookmarks_count, post.reposts_count
    );
}

async fn print_comments(blog: &BlogService<'_>, post: &str) -> Result<()> {
    let comments = blog.list_comments(post).await?;
    if comments.is_empty() {
        println!("\nNo comments yet.");
        return Ok(());
    }
    println!("\nComments:");
    let rows = thread::flatten(&comments);
    print!("{}", thread::render_text(&rows, Utc::now()));
    Ok(())
}
