mod auth;
mod boot;
mod config;
mod content;
mod db;
mod generator;
mod lock;
mod markdown;
mod models;
mod options;
mod rate_limit;
mod render;

#[cfg(test)]
mod tests;

use std::process::ExitCode;

use generator::Generator;
use models::category::Category;
use models::media::Media;
use models::post::Post;
use models::tag::Tag;
use models::user::User;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("help");

    match run(command, &args[1.min(args.len())..]) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: &str, flags: &[String]) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        "migrate" => {
            let fresh = flags.iter().any(|f| f == "--fresh");
            let seed = flags.iter().any(|f| f == "--seed");

            if fresh {
                let config = config::Config::load();
                if config.database_path.exists() {
                    std::fs::remove_file(&config.database_path)?;
                    println!("Dropped {}", config.database_path.display());
                }
            }

            // boot applies the schema
            let app = boot::boot()?;
            println!("Schema is up to date");

            if seed {
                db::seed_defaults(&app.pool)?;
                println!("Seeded default options and admin user");
            }
            Ok(ExitCode::SUCCESS)
        }
        "seed" => {
            let app = boot::boot()?;
            db::seed_defaults(&app.pool)?;
            app.options.invalidate();
            app.options.write_snapshot();
            println!("Seeded default options and admin user");
            Ok(ExitCode::SUCCESS)
        }
        "generate" => {
            let app = boot::boot()?;
            let generator = Generator::new(
                app.pool.clone(),
                app.config.output_dir.clone(),
                app.config.lock_file(),
                app.config.log_file(),
            );
            let report = generator.generate_all();
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.success {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        "status" => {
            let app = boot::boot()?;
            println!("Database: {}", app.config.database_path.display());
            println!("Output:   {}", app.config.output_dir.display());
            println!("Uploads:  {}", app.config.uploads_dir.display());
            println!("Posts:      {} ({} published)", Post::count(&app.pool), Post::count_published(&app.pool));
            println!("Categories: {}", Category::count(&app.pool));
            println!("Tags:       {}", Tag::count(&app.pool));
            println!("Media:      {}", Media::count(&app.pool));
            println!("Users:      {}", User::list(&app.pool).len());

            if let Some(last) = last_log_line(&app.config.log_file()) {
                println!("Last run:   {}", last);
            }
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            println!("plume - blog engine with a static site generator");
            println!();
            println!("Usage: plume <command>");
            println!();
            println!("Commands:");
            println!("  migrate [--fresh] [--seed]  Apply the schema (--fresh drops the database first)");
            println!("  seed                        Insert default options and the admin user");
            println!("  generate                    Regenerate the static site");
            println!("  status                      Show content counts and the last generation run");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn last_log_line(path: &std::path::Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    contents.lines().last().map(str::to_string)
}
