use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use atelier_api::db::create_pool;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")?;

    let pool = create_pool(&database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let staff_id = ensure_user(&pool, "staff@example.com", "staff123!", "staff").await?;
    let user_id = ensure_user(&pool, "user@example.com", "user1234", "user").await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Staff ID: {staff_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, password_hash, role) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO carts (id, user_id) VALUES ($1, $2)")
        .bind(Uuid::new_v4())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let already: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
        .fetch_one(pool)
        .await?;
    if already.0 > 0 {
        return Ok(());
    }

    let category_id = Uuid::new_v4();
    sqlx::query("INSERT INTO categories (id, name) VALUES ($1, 'T-shirt')")
        .bind(category_id)
        .execute(pool)
        .await?;

    let color_id = Uuid::new_v4();
    sqlx::query("INSERT INTO colors (id, name, color) VALUES ($1, 'Forest', '#008000')")
        .bind(color_id)
        .execute(pool)
        .await?;

    let mut garment_ids = Vec::new();
    for size in ["S", "M", "L"] {
        let garment_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO garments (id, category_id, color_id, size, count, price)
             VALUES ($1, $2, $3, $4, 10, 50)",
        )
        .bind(garment_id)
        .bind(category_id)
        .bind(color_id)
        .bind(size)
        .execute(pool)
        .await?;
        garment_ids.push(garment_id);
    }

    let product_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO products (id, name, price, embroidery_file)
         VALUES ($1, 'Fox embroidery tee', 100, 'catalog/file/fox.dst')",
    )
    .bind(product_id)
    .execute(pool)
    .await?;

    for garment_id in &garment_ids {
        sqlx::query("INSERT INTO product_garments (product_id, garment_id) VALUES ($1, $2)")
            .bind(product_id)
            .bind(garment_id)
            .execute(pool)
            .await?;
    }

    Ok(())
}
