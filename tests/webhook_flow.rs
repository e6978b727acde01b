use axum::{Json, Router, http::StatusCode, routing::post};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use atelier_api::{
    config::PaymentConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::orders::CreateOrderRequest,
    entity::{
        cart_items::ActiveModel as CartItemActive,
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts},
        categories::ActiveModel as CategoryActive,
        colors::ActiveModel as ColorActive,
        garments::ActiveModel as GarmentActive,
        orders::Entity as Orders,
        product_garments::ActiveModel as ProductGarmentActive,
        products::ActiveModel as ProductActive,
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    payments::{PaymentClient, WebhookNotification, WebhookObject},
    services::{order_service, webhook_service},
    state::AppState,
};

// Webhook reconciliation under at-least-once delivery: embroidery routing,
// duplicate redelivery as a no-op, and first-writer-wins when conflicting
// events arrive out of order.
#[tokio::test]
async fn webhook_settlement_is_idempotent_and_monotonic() -> anyhow::Result<()> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let provider = spawn_payment_stub().await;
    let state = setup_state(&database_url, &provider).await?;

    // --- an embroidered product routes a paid order to the workbench
    let user = create_user(&state, &unique_email("stitch")).await?;
    let embroidered = seed_product(&state, Some("catalog/file/fox.dst"), 8).await?;
    fill_cart(&state, &user, &embroidered, 1).await?;
    let order_id = order_service::create_order(&state, &user, checkout_payload()).await?;
    let payment_id = payment_id_of(&state, order_id).await?;

    webhook_service::handle_webhook(&state, succeeded(&payment_id)).await?;
    let order = fetch_order(&state, order_id).await?;
    assert_eq!(order.status, "in_work");
    assert_eq!(order.payment_status, "succeeded");

    // duplicate redelivery of the same event leaves the state unchanged
    webhook_service::handle_webhook(&state, succeeded(&payment_id)).await?;
    let order = fetch_order(&state, order_id).await?;
    assert_eq!(order.status, "in_work");
    assert_eq!(order.payment_status, "succeeded");

    // a conflicting cancel arriving after settlement is acknowledged but ignored
    webhook_service::handle_webhook(&state, canceled(&payment_id)).await?;
    let order = fetch_order(&state, order_id).await?;
    assert_eq!(order.status, "in_work");
    assert_eq!(order.payment_status, "succeeded");

    // --- a plain product goes straight to paid
    let buyer = create_user(&state, &unique_email("plain")).await?;
    let plain = seed_product(&state, None, 8).await?;
    fill_cart(&state, &buyer, &plain, 1).await?;
    let plain_order = order_service::create_order(&state, &buyer, checkout_payload()).await?;
    let plain_payment = payment_id_of(&state, plain_order).await?;

    webhook_service::handle_webhook(&state, succeeded(&plain_payment)).await?;
    let order = fetch_order(&state, plain_order).await?;
    assert_eq!(order.status, "paid");

    // --- cancellation settles both statuses
    let quitter = create_user(&state, &unique_email("cancel")).await?;
    let fixture = seed_product(&state, None, 8).await?;
    fill_cart(&state, &quitter, &fixture, 2).await?;
    let canceled_order = order_service::create_order(&state, &quitter, checkout_payload()).await?;
    let canceled_payment = payment_id_of(&state, canceled_order).await?;

    webhook_service::handle_webhook(&state, canceled(&canceled_payment)).await?;
    let order = fetch_order(&state, canceled_order).await?;
    assert_eq!(order.status, "canceled");
    assert_eq!(order.payment_status, "canceled");

    // a late success for the canceled payment does not resurrect the order
    webhook_service::handle_webhook(&state, succeeded(&canceled_payment)).await?;
    let order = fetch_order(&state, canceled_order).await?;
    assert_eq!(order.status, "canceled");

    Ok(())
}

#[tokio::test]
async fn webhook_rejects_malformed_and_unknown_deliveries() -> anyhow::Result<()> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let provider = spawn_payment_stub().await;
    let state = setup_state(&database_url, &provider).await?;

    let err = webhook_service::handle_webhook(
        &state,
        WebhookNotification {
            kind: "refund".into(),
            event: "payment.succeeded".into(),
            object: WebhookObject { id: "pay-x".into() },
        },
    )
    .await
    .expect_err("non-notification type must be rejected");
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = webhook_service::handle_webhook(
        &state,
        WebhookNotification {
            kind: "notification".into(),
            event: "payment.refunded".into(),
            object: WebhookObject { id: "pay-x".into() },
        },
    )
    .await
    .expect_err("unknown events must be rejected");
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = webhook_service::handle_webhook(
        &state,
        succeeded(&format!("pay-{}", Uuid::new_v4())),
    )
    .await
    .expect_err("unknown payment id must 404");
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}

fn succeeded(payment_id: &str) -> WebhookNotification {
    WebhookNotification {
        kind: "notification".into(),
        event: "payment.succeeded".into(),
        object: WebhookObject {
            id: payment_id.to_string(),
        },
    }
}

fn canceled(payment_id: &str) -> WebhookNotification {
    WebhookNotification {
        kind: "notification".into(),
        event: "payment.canceled".into(),
        object: WebhookObject {
            id: payment_id.to_string(),
        },
    }
}

fn checkout_payload() -> CreateOrderRequest {
    CreateOrderRequest {
        address: "Nevsky pr. 5, Saint Petersburg".into(),
        phone: "89123456789".into(),
    }
}

fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4())
}

struct CatalogFixture {
    product_id: Uuid,
    garment_id: Uuid,
}

// Tests in this binary run in parallel; apply migrations once.
static MIGRATIONS: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

async fn setup_state(database_url: &str, provider_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    MIGRATIONS
        .get_or_try_init(|| async { run_migrations(&orm).await })
        .await?;

    let payments = PaymentClient::new(PaymentConfig {
        api_url: provider_url.to_string(),
        shop_id: "test-shop".into(),
        secret_key: "test-secret".into(),
        return_url: "http://localhost:3000/orders".into(),
    });

    Ok(AppState::new(pool, orm, payments))
}

async fn create_user(state: &AppState, email: &str) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set("user".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role: "user".into(),
    })
}

async fn seed_product(
    state: &AppState,
    embroidery_file: Option<&str>,
    stock: i32,
) -> anyhow::Result<CatalogFixture> {
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("Sweatshirt {}", Uuid::new_v4())),
    }
    .insert(&state.orm)
    .await?;

    let color = ColorActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("Clay {}", Uuid::new_v4())),
        color: Set("#b66a50".into()),
    }
    .insert(&state.orm)
    .await?;

    let garment = GarmentActive {
        id: Set(Uuid::new_v4()),
        category_id: Set(category.id),
        color_id: Set(color.id),
        size: Set("L".into()),
        count: Set(stock),
        price: Set(40),
    }
    .insert(&state.orm)
    .await?;

    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("Tee {}", Uuid::new_v4())),
        price: Set(110),
        embroidery_file: Set(embroidery_file.map(|s| s.to_string())),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    ProductGarmentActive {
        product_id: Set(product.id),
        garment_id: Set(garment.id),
    }
    .insert(&state.orm)
    .await?;

    Ok(CatalogFixture {
        product_id: product.id,
        garment_id: garment.id,
    })
}

async fn fill_cart(
    state: &AppState,
    user: &AuthUser,
    fixture: &CatalogFixture,
    quantity: i32,
) -> anyhow::Result<()> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .expect("cart row");

    CartItemActive {
        id: Set(Uuid::new_v4()),
        cart_id: Set(cart.id),
        product_id: Set(fixture.product_id),
        garment_id: Set(fixture.garment_id),
        quantity: Set(quantity),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(())
}

async fn payment_id_of(state: &AppState, order_id: Uuid) -> anyhow::Result<String> {
    let order = fetch_order(state, order_id).await?;
    Ok(order.payment_id.expect("payment id set at checkout"))
}

async fn fetch_order(
    state: &AppState,
    order_id: Uuid,
) -> anyhow::Result<atelier_api::entity::orders::Model> {
    Ok(Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .expect("order row"))
}

/// Minimal provider stub: checkout only needs create-payment to answer.
async fn spawn_payment_stub() -> String {
    async fn create_payment() -> (StatusCode, Json<serde_json::Value>) {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": format!("pay-{}", Uuid::new_v4()),
                "status": "pending",
                "confirmation": {
                    "type": "redirect",
                    "confirmation_url": "https://pay.test/confirm"
                }
            })),
        )
    }

    let app = Router::new().route("/payments", post(create_payment));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind payment stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("payment stub");
    });
    format!("http://{addr}")
}
