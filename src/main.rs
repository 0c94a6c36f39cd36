use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use tatib::db::Database;
use tatib::ledger::ViolationUpdate;
use tatib::query::{user_message, SearchFilter};
use tatib::Config;

#[derive(Parser, Debug)]
#[command(name = "tatib")]
#[command(author, version, about = "Student violation tracking and point ledger")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a tatib workspace in the current directory
    Init,

    /// Start the admin JSON API server
    Serve {
        /// Port to listen on (default from config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage violation categories
    Category {
        #[command(subcommand)]
        action: CategoryCmd,
    },

    /// Manage violation types
    Type {
        #[command(subcommand)]
        action: TypeCmd,
    },

    /// Manage the student directory
    Student {
        #[command(subcommand)]
        action: StudentCmd,
    },

    /// Record a violation against a student
    Record {
        /// Student id
        student_id: i32,
        /// Violation type id
        type_id: i32,
        /// Incident date (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,
        /// Override the type's default points
        #[arg(short, long)]
        points: Option<i32>,
        /// Action taken by staff
        #[arg(short, long)]
        action: Option<String>,
        /// Free-text notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Amend an existing violation
    Amend {
        /// Violation id
        id: i32,
        /// New incident date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<String>,
        /// New point value (adjusts the student's total by the difference)
        #[arg(short, long)]
        points: Option<i32>,
        /// New action taken
        #[arg(short, long)]
        action: Option<String>,
        /// New notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Delete a violation, reversing its points from the student's total
    Expunge {
        /// Violation id
        id: i32,
    },

    /// List a student's violations, newest first
    List {
        /// Student id
        student_id: i32,
    },

    /// Search violations across all students
    Search {
        /// Free-text filter over student and type names
        #[arg(short, long)]
        q: Option<String>,
        /// Inclusive start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Inclusive end date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Page number
        #[arg(long, default_value = "1")]
        page: i64,
        /// Page size
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Show a student's current point total
    Points {
        /// Student id
        student_id: i32,
    },

    /// Point totals for all students, highest first
    Recap,

    /// Generate shell completions
    Completion {
        /// Shell to generate for
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum CategoryCmd {
    /// Add a category
    Add {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List all categories
    List,
    /// Delete a category and everything under it
    Rm { id: i32 },
}

#[derive(Subcommand, Debug)]
enum TypeCmd {
    /// Add a type under a category
    Add {
        category_id: i32,
        name: String,
        /// Default points suggested when recording this type
        #[arg(short, long, default_value = "0")]
        points: i32,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List types, optionally for one category
    List {
        #[arg(short, long)]
        category: Option<i32>,
    },
    /// Delete a type and its violations
    Rm { id: i32 },
}

#[derive(Subcommand, Debug)]
enum StudentCmd {
    /// Register a student
    Add {
        /// Student number (NIS)
        nis: String,
        name: String,
        #[arg(short, long)]
        class: Option<String>,
    },
    /// List all students
    List,
    /// Remove a student and their records
    Rm { id: i32 },
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args.command) {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Init => tatib::init::run_init(),

        Command::Serve { port } => {
            let config = Config::load();
            let port = port.unwrap_or(config.server.port);
            tatib::serve::start_server(port)?;
            Ok(())
        }

        Command::Completion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(shell, &mut cmd, "tatib", &mut std::io::stdout());
            Ok(())
        }

        Command::Category { action } => {
            let db = Database::open()?;
            match action {
                CategoryCmd::Add { name, description } => {
                    let id = db.create_category(&name, description.as_deref())?;
                    println!("{} category {} ({})", "Added".green(), name.bold(), id);
                }
                CategoryCmd::List => {
                    let categories = db.list_categories()?;
                    if categories.is_empty() {
                        println!("No categories yet. Add one with {}.", "tatib category add".cyan());
                    }
                    for c in categories {
                        println!(
                            "{:>4}  {}  {}",
                            c.id,
                            c.name.bold(),
                            c.description.unwrap_or_default().dimmed()
                        );
                    }
                }
                CategoryCmd::Rm { id } => {
                    let summary = db.delete_category(id)?;
                    println!(
                        "{} category {} ({} types, {} violations removed)",
                        "Deleted".yellow(),
                        id,
                        summary.types_removed,
                        summary.violations_removed
                    );
                }
            }
            Ok(())
        }

        Command::Type { action } => {
            let db = Database::open()?;
            match action {
                TypeCmd::Add {
                    category_id,
                    name,
                    points,
                    description,
                } => {
                    let id = db.create_type(category_id, &name, description.as_deref(), points)?;
                    println!(
                        "{} type {} ({}) with {} default points",
                        "Added".green(),
                        name.bold(),
                        id,
                        points
                    );
                }
                TypeCmd::List { category } => {
                    for t in db.list_types(category)? {
                        println!(
                            "{:>4}  {:<30} {:>4} pts  (category {})",
                            t.id,
                            t.name.bold(),
                            t.default_points,
                            t.category_id
                        );
                    }
                }
                TypeCmd::Rm { id } => {
                    let summary = db.delete_type(id)?;
                    println!(
                        "{} type {} ({} violations removed)",
                        "Deleted".yellow(),
                        id,
                        summary.violations_removed
                    );
                }
            }
            Ok(())
        }

        Command::Student { action } => {
            let db = Database::open()?;
            match action {
                StudentCmd::Add { nis, name, class } => {
                    let id = db.add_student(&nis, &name, class.as_deref())?;
                    println!("{} student {} ({})", "Added".green(), name.bold(), id);
                }
                StudentCmd::List => {
                    for s in db.list_students()? {
                        println!(
                            "{:>4}  {:<10} {:<30} {}",
                            s.id,
                            s.nis,
                            s.name.bold(),
                            s.class_name.unwrap_or_default().dimmed()
                        );
                    }
                }
                StudentCmd::Rm { id } => {
                    let removed = db.remove_student(id)?;
                    println!(
                        "{} student {} ({} violations removed)",
                        "Deleted".yellow(),
                        id,
                        removed
                    );
                }
            }
            Ok(())
        }

        Command::Record {
            student_id,
            type_id,
            date,
            points,
            action,
            notes,
        } => {
            let db = Database::open()?;
            let date =
                date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
            let violation = db.record_violation(
                student_id,
                type_id,
                &date,
                points,
                action.as_deref(),
                notes.as_deref(),
            )?;
            let total = db.points_for_student(student_id)?;
            println!(
                "{} violation {} for student {} ({} points, total now {})",
                "Recorded".green(),
                violation.id,
                student_id,
                violation.points,
                total.to_string().bold()
            );
            Ok(())
        }

        Command::Amend {
            id,
            date,
            points,
            action,
            notes,
        } => {
            let db = Database::open()?;
            let update = ViolationUpdate {
                violation_date: date,
                points,
                action_taken: action.map(Some),
                notes: notes.map(Some),
            };
            let violation = db.amend_violation(id, update).map_err(|e| user_message(&e))?;
            let total = db.points_for_student(violation.student_id)?;
            println!(
                "{} violation {} ({} points, total now {})",
                "Amended".green(),
                id,
                violation.points,
                total.to_string().bold()
            );
            Ok(())
        }

        Command::Expunge { id } => {
            let db = Database::open()?;
            db.expunge_violation(id).map_err(|e| user_message(&e))?;
            println!("{} violation {}", "Expunged".yellow(), id);
            Ok(())
        }

        Command::List { student_id } => {
            let db = Database::open()?;
            let student = db.get_student(student_id)?;
            let rows = db.list_for_student(student_id)?;
            let total = db.points_for_student(student_id)?;
            println!(
                "\n{} ({}): {} points\n",
                student.name.bold(),
                student.nis,
                total.to_string().red().bold()
            );
            for v in rows {
                let vtype = db.get_type(v.type_id)?;
                println!(
                    "{:>4}  {}  {:<30} {:>4} pts  {}",
                    v.id,
                    v.violation_date,
                    vtype.name,
                    v.points,
                    v.action_taken.unwrap_or_default().dimmed()
                );
            }
            Ok(())
        }

        Command::Search {
            q,
            from,
            to,
            page,
            limit,
        } => {
            let db = Database::open()?;
            let config = Config::load();
            let filter = SearchFilter { q, from, to };
            let result =
                db.search_violations(&filter, page, limit.unwrap_or_else(|| config.page_size()))?;
            for row in &result.items {
                println!(
                    "{:>4}  {}  {:<24} {:<28} {:>4} pts",
                    row.id,
                    row.violation_date,
                    row.student_name.bold(),
                    row.type_name,
                    row.points
                );
            }
            println!(
                "\nPage {}/{} ({} total)",
                result.meta.current_page,
                result.meta.total_pages,
                result.meta.total_items
            );
            Ok(())
        }

        Command::Points { student_id } => {
            let db = Database::open()?;
            let total = db.points_for_student(student_id)?;
            println!("{}", total);
            Ok(())
        }

        Command::Recap => {
            let db = Database::open()?;
            for row in db.point_recap()? {
                println!(
                    "{:>4} pts  {:<10} {:<30} {}",
                    row.total.to_string().bold(),
                    row.nis,
                    row.student_name,
                    row.class_name.unwrap_or_default().dimmed()
                );
            }
            Ok(())
        }
    }
}
