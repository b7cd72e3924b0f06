use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{MySql, Pool, mysql::MySqlPoolOptions};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    // Args: host port user pass db table_a table_b rows
    let args: Vec<String> = std::env::args().collect();
    let host = args.get(1).cloned().unwrap_or_else(|| "127.0.0.1".into());
    let port = args
        .get(2)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3306);
    let user = args.get(3).cloned().unwrap_or_else(|| "root".into());
    let pass = args.get(4).cloned().unwrap_or_else(|| "root".into());
    let db = args
        .get(5)
        .cloned()
        .unwrap_or_else(|| "record_linkage".into());
    let table_a = args.get(6).cloned().unwrap_or_else(|| "persons_a".into());
    let table_b = args.get(7).cloned().unwrap_or_else(|| "persons_b".into());
    let rows = args
        .get(8)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10000);

    println!("Seeding MySQL {db}::{table_a},{table_b} on {host}:{port} with {rows} planted rows...");

    // 1) Connect to server-level DB to create target database
    let url_server = format!("mysql://{user}:{pass}@{host}:{port}/mysql");
    let pool_server = MySqlPoolOptions::new()
        .max_connections(5)
        .connect(&url_server)
        .await?;
    sqlx::query(&format!(
        "CREATE DATABASE IF NOT EXISTS `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_0900_ai_ci",
        db
    ))
    .execute(&pool_server)
    .await?;

    // 2) Connect to target database
    let url_db = format!("mysql://{user}:{pass}@{host}:{port}/{db}");
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .connect(&url_db)
        .await?;

    // 3) Create tables
    create_table(&pool, &table_a).await?;
    create_table(&pool, &table_b).await?;

    // 4) Plant linkage scenarios across both tables
    seed_pairs(&pool, &table_a, &table_b, rows, 42).await?;

    println!("Seeding complete.");
    Ok(())
}

async fn create_table(pool: &Pool<MySql>, table: &str) -> Result<()> {
    // Recreate so reruns start from a known state
    let _ = sqlx::query(&format!("DROP TABLE IF EXISTS `{}`", table))
        .execute(pool)
        .await;

    // Secondary indexes line up with the blocking equi-joins
    let sql = format!(
        "CREATE TABLE `{table}` (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            forename VARCHAR(100) NULL,
            surname VARCHAR(100) NULL,
            dob DATE NULL,
            postcode VARCHAR(16) NULL,
            INDEX idx_surname_dob (surname, dob),
            INDEX idx_postcode (postcode)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_0900_ai_ci"
    );
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

#[derive(Clone)]
struct PersonRow {
    forename: Option<String>,
    surname: Option<String>,
    dob: Option<NaiveDate>,
    postcode: Option<String>,
}

/// Plant one scenario per side-A row so a linkage run over the seeded tables
/// produces a known mix of decisions:
///   exact copy (raw-value jitter only)        -> MATCH
///   forename typo within one edit             -> TIER2
///   dob missing on one or both sides          -> TIER3
///   different postcode                        -> TIER3
///   no counterpart in B                       -> NO_MATCH under augmentation
async fn seed_pairs(
    pool: &Pool<MySql>,
    table_a: &str,
    table_b: &str,
    rows: usize,
    seed: u64,
) -> Result<()> {
    let mut rng = Lcg::new(seed);
    let forenames = sample_forenames();
    let surnames = sample_surnames();

    let mut a_rows: Vec<PersonRow> = Vec::with_capacity(rows);
    let mut b_rows: Vec<PersonRow> = Vec::new();
    let (mut exact, mut fuzzy, mut missing_dob, mut diff_postcode, mut unmatched) =
        (0usize, 0usize, 0usize, 0usize, 0usize);

    for _ in 0..rows {
        let forename = forenames[(rng.next() as usize) % forenames.len()].to_string();
        let surname = surnames[(rng.next() as usize) % surnames.len()].to_string();
        let dob = random_birthdate(&mut rng);
        let postcode = random_postcode(&mut rng);

        let scenario = rng.next() % 100;
        match scenario {
            0..=39 => {
                // Exact duplicate; vary only case and spacing on the B side
                exact += 1;
                a_rows.push(person(&forename, &surname, Some(dob), &postcode));
                b_rows.push(PersonRow {
                    forename: Some(jitter_name(&mut rng, &forename)),
                    surname: Some(jitter_name(&mut rng, &surname)),
                    dob: Some(dob),
                    postcode: Some(jitter_postcode(&mut rng, &postcode)),
                });
            }
            40..=54 => {
                // One-edit typo in the forename
                fuzzy += 1;
                a_rows.push(person(&forename, &surname, Some(dob), &postcode));
                b_rows.push(person(&typo(&mut rng, &forename), &surname, Some(dob), &postcode));
            }
            55..=64 => {
                // B side lost the dob
                missing_dob += 1;
                a_rows.push(person(&forename, &surname, Some(dob), &postcode));
                b_rows.push(person(&forename, &surname, None, &postcode));
            }
            65..=69 => {
                // Neither side has a dob
                missing_dob += 1;
                a_rows.push(person(&forename, &surname, None, &postcode));
                b_rows.push(person(&forename, &surname, None, &postcode));
            }
            70..=79 => {
                // Same person, moved house
                diff_postcode += 1;
                a_rows.push(person(&forename, &surname, Some(dob), &postcode));
                b_rows.push(person(&forename, &surname, Some(dob), &random_postcode(&mut rng)));
            }
            _ => {
                unmatched += 1;
                a_rows.push(person(&forename, &surname, Some(dob), &postcode));
            }
        }
    }

    // Noise rows on the B side so it is not a pure mirror of A
    let noise = rows / 4;
    for _ in 0..noise {
        let forename = forenames[(rng.next() as usize) % forenames.len()];
        let surname = surnames[(rng.next() as usize) % surnames.len()];
        let postcode = random_postcode(&mut rng);
        b_rows.push(person(forename, surname, Some(random_birthdate(&mut rng)), &postcode));
    }

    println!(
        "  Planted per-pair scenarios: {} exact, {} fuzzy forename, {} missing dob, {} changed postcode, {} without a counterpart",
        exact, fuzzy, missing_dob, diff_postcode, unmatched
    );
    println!("  Adding {} noise rows to {}", noise, table_b);

    insert_batches(pool, table_a, &a_rows).await?;
    insert_batches(pool, table_b, &b_rows).await?;

    println!(
        "  Inserted {} rows into {} and {} rows into {}",
        a_rows.len(),
        table_a,
        b_rows.len(),
        table_b
    );
    Ok(())
}

fn person(forename: &str, surname: &str, dob: Option<NaiveDate>, postcode: &str) -> PersonRow {
    PersonRow {
        forename: Some(forename.to_string()),
        surname: Some(surname.to_string()),
        dob,
        postcode: Some(postcode.to_string()),
    }
}

async fn insert_batches(pool: &Pool<MySql>, table: &str, rows: &[PersonRow]) -> Result<()> {
    // Insert in batches to stay clear of placeholder limits
    let batch_cap = 1000usize;
    for chunk in rows.chunks(batch_cap) {
        let mut q = sqlx::QueryBuilder::<MySql>::new("INSERT INTO ");
        q.push("`")
            .push(table)
            .push("` (forename, surname, dob, postcode) VALUES ");
        let mut first = true;
        for r in chunk {
            if !first {
                q.push(", ");
            }
            first = false;
            q.push("(")
                .push_bind(r.forename.clone())
                .push(", ")
                .push_bind(r.surname.clone())
                .push(", ")
                .push_bind(r.dob)
                .push(", ")
                .push_bind(r.postcode.clone())
                .push(")");
        }
        q.build().execute(pool).await?;
    }
    Ok(())
}

/// Case and whitespace jitter; normalizes back to the original value.
fn jitter_name(rng: &mut Lcg, name: &str) -> String {
    match rng.next() % 4 {
        0 => name.to_uppercase(),
        1 => format!(" {} ", name),
        2 => name.to_lowercase(),
        _ => name.to_string(),
    }
}

fn jitter_postcode(rng: &mut Lcg, postcode: &str) -> String {
    match rng.next() % 3 {
        0 => postcode.to_lowercase(),
        1 => postcode.replace(' ', ""),
        _ => postcode.to_string(),
    }
}

/// Replace one inner letter, keeping the result within edit distance 1.
fn typo(rng: &mut Lcg, name: &str) -> String {
    let mut chars: Vec<char> = name.chars().collect();
    if chars.len() < 3 {
        return name.to_string();
    }
    let i = 1 + (rng.next() as usize) % (chars.len() - 1);
    let c = chars[i];
    chars[i] = match c {
        'z' | 'Z' => 'y',
        c if c.is_ascii_alphabetic() => (c as u8 + 1) as char,
        _ => 'x',
    };
    chars.into_iter().collect()
}

fn random_postcode(rng: &mut Lcg) -> String {
    let a = (b'A' + (rng.next() % 26) as u8) as char;
    let b = (b'A' + (rng.next() % 26) as u8) as char;
    let d1 = rng.next() % 10;
    let d2 = rng.next() % 10;
    let e = (b'A' + (rng.next() % 26) as u8) as char;
    let f = (b'A' + (rng.next() % 26) as u8) as char;
    format!("{a}{b}{d1} {d2}{e}{f}")
}

fn random_birthdate(rng: &mut Lcg) -> NaiveDate {
    // Between 1950-01-01 and 2010-12-31
    let year = 1950 + (rng.next() % 61) as i32;
    let month = 1 + (rng.next() % 12) as u32;
    let mut day_max = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => 28,
    };
    // handle leap years simply
    if month == 2 && (year % 4 == 0) {
        day_max = 29;
    }
    let day = 1 + (rng.next() % day_max as u64) as u32;
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(2000, 1, 1).unwrap())
}

struct Lcg {
    state: u64,
}
impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }
    fn next(&mut self) -> u64 {
        // Numerical Recipes LCG constants
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.state
    }
}

fn sample_forenames() -> Vec<&'static str> {
    vec![
        "James", "Mary", "Robert", "Patricia", "John", "Jennifer", "Michael", "Linda", "David",
        "Susan", "Thomas", "Sarah", "Daniel", "Karen", "Matthew", "Nancy", "Andrew", "Lisa",
        "Stephen", "Emily", "Peter", "Alice", "George", "Helen", "Edward", "Margaret", "Henry",
        "Catherine", "Arthur", "Dorothy", "José", "Zoë",
    ]
}

fn sample_surnames() -> Vec<&'static str> {
    vec![
        "Smith", "Jones", "Taylor", "Brown", "Williams", "Wilson", "Johnson", "Davies", "Robinson",
        "Wright", "Thompson", "Evans", "Walker", "White", "Roberts", "Green", "Hall", "Wood",
        "Jackson", "Clarke", "Hughes", "Edwards", "Turner", "Moore", "O'Brien", "Hernández",
        "Lee", "King", "Baker", "Harris", "Smith-Jones", "De La Cruz",
    ]
}
