use atrio_core::models::{Instance, Principal};
use sqlx::PgPool;

/// Channel identities visible to the caller. Agents only see lines they
/// own; admins and managers see the whole floor.
pub async fn list(pool: &PgPool, principal: &Principal) -> Result<Vec<Instance>, sqlx::Error> {
    sqlx::query_as::<_, Instance>(
        r#"
        SELECT id, label, phone_number, owner_agent, created_at
        FROM instances
        WHERE ($1::boolean OR owner_agent = $2)
        ORDER BY label ASC
        "#,
    )
    .bind(principal.sees_all())
    .bind(&principal.actor)
    .fetch_all(pool)
    .await
}
