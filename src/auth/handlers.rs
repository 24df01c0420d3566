use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, PublicUser, RegisterRequest, ResetPasswordRequest,
            ResetRequest,
        },
        extractors::{AuthUser, MaybeUser},
        password::{hash_password, verify_password},
        repo::{User, UserError},
        tokens::SessionKeys,
    },
    images,
    mail::reset_message,
    state::AppState,
    validation::{check_email, check_password_pair, check_username, FieldError},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", get(register_page).post(register))
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout).post(logout))
        .route("/account", get(account).post(update_account))
        .route("/reset_password", get(reset_request_page).post(reset_request))
        .route(
            "/reset_password/:token",
            get(reset_token_page).post(reset_password),
        )
        .layer(DefaultBodyLimit::max(5 * 1024 * 1024))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn field_errors(errors: Vec<FieldError>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "errors": errors })),
    )
        .into_response()
}

/// `Set-Cookie` value mirroring the session token. A `remember` session
/// gets an explicit Max-Age; otherwise the cookie is browser-session
/// scoped.
fn session_cookie(token: &str, remember: bool, max_age_secs: u64) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        crate::auth::extractors::SESSION_COOKIE,
        token
    );
    if remember {
        cookie.push_str(&format!("; Max-Age={}", max_age_secs));
    }
    cookie
}

fn clear_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        crate::auth::extractors::SESSION_COOKIE
    )
}

// Form pages render client-side; these routes only enforce the
// already-authenticated short-circuit.

#[instrument]
pub async fn register_page(MaybeUser(current): MaybeUser) -> Response {
    match current {
        Some(_) => Redirect::to("/").into_response(),
        None => StatusCode::OK.into_response(),
    }
}

#[instrument]
pub async fn login_page(MaybeUser(current): MaybeUser) -> Response {
    match current {
        Some(_) => Redirect::to("/").into_response(),
        None => StatusCode::OK.into_response(),
    }
}

#[instrument]
pub async fn reset_request_page(MaybeUser(current): MaybeUser) -> Response {
    match current {
        Some(_) => Redirect::to("/").into_response(),
        None => StatusCode::OK.into_response(),
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Response, (StatusCode, String)> {
    if current.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    payload.username = payload.username.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    let mut errors: Vec<FieldError> = [
        check_username(&payload.username),
        check_email(&payload.email),
        check_password_pair(&payload.password, &payload.confirm_password),
    ]
    .into_iter()
    .flatten()
    .collect();

    if errors.is_empty() {
        if User::username_taken(&state.db, &payload.username, None)
            .await
            .map_err(internal)?
        {
            errors.push(FieldError::new(
                "username",
                "Username is taken. Please choose another one.",
            ));
        }
        if User::email_taken(&state.db, &payload.email, None)
            .await
            .map_err(internal)?
        {
            errors.push(FieldError::new(
                "email",
                "Email is taken. Please choose another one.",
            ));
        }
    }
    if !errors.is_empty() {
        warn!(username = %payload.username, "registration rejected");
        return Ok(field_errors(errors));
    }

    let hash = hash_password(&payload.password).map_err(internal)?;
    let user = match User::create(&state.db, &payload.username, &payload.email, &hash).await {
        Ok(u) => u,
        // Lost a race with a concurrent registration; report it the same
        // way the pre-insert checks would have.
        Err(UserError::DuplicateUsername) => {
            return Ok(field_errors(vec![FieldError::new(
                "username",
                "Username is taken. Please choose another one.",
            )]))
        }
        Err(UserError::DuplicateEmail) => {
            return Ok(field_errors(vec![FieldError::new(
                "email",
                "Email is taken. Please choose another one.",
            )]))
        }
        Err(UserError::Db(e)) => {
            error!(error = %e, "create user failed");
            return Err(internal(e));
        }
    };

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(PublicUser::from_user(&state, &user)),
    )
        .into_response())
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Response, (StatusCode, String)> {
    if current.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    payload.email = payload.email.trim().to_lowercase();

    let user = match User::find_by_email(&state.db, &payload.email)
        .await
        .map_err(internal)?
    {
        Some(u) => u,
        None => {
            warn!("login with unknown email");
            return Err((
                StatusCode::UNAUTHORIZED,
                "Login unsuccessful. Please check email and password.".into(),
            ));
        }
    };

    let ok = verify_password(&payload.password, &user.password_hash).map_err(internal)?;
    if !ok {
        warn!(user_id = %user.id, "login with invalid password");
        return Err((
            StatusCode::UNAUTHORIZED,
            "Login unsuccessful. Please check email and password.".into(),
        ));
    }

    let keys = SessionKeys::from_ref(&state);
    let token = keys
        .sign_session(user.id, payload.remember)
        .map_err(internal)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        session_cookie(&token, payload.remember, keys.remember_ttl.as_secs())
            .parse()
            .map_err(internal)?,
    );

    info!(user_id = %user.id, remember = payload.remember, "user logged in");
    Ok((
        headers,
        Json(AuthResponse {
            session_token: token,
            user: PublicUser::from_user(&state, &user),
        }),
    )
        .into_response())
}

#[instrument]
pub async fn logout() -> Result<Response, (StatusCode, String)> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        clear_session_cookie().parse().map_err(internal)?,
    );
    Ok((headers, Redirect::to("/login")).into_response())
}

#[instrument(skip(state))]
pub async fn account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "Login required".to_string()))?;
    Ok(Json(PublicUser::from_user(&state, &user)))
}

/// Multipart form: `username`, `email`, optional `password`, optional
/// `picture` file.
#[instrument(skip(state, mp))]
pub async fn update_account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<Response, (StatusCode, String)> {
    let current = User::find_by_id(&state.db, user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "Login required".to_string()))?;

    let mut username = current.username.clone();
    let mut email = current.email.clone();
    let mut password: Option<String> = None;
    let mut picture: Option<(String, bytes::Bytes)> = None;

    while let Ok(Some(field)) = mp.next_field().await {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("username") => username = field.text().await.map_err(internal)?,
            Some("email") => email = field.text().await.map_err(internal)?,
            Some("password") => {
                let value = field.text().await.map_err(internal)?;
                if !value.is_empty() {
                    password = Some(value);
                }
            }
            Some("picture") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(internal)?;
                if !data.is_empty() {
                    picture = Some((file_name, data));
                }
            }
            _ => {}
        }
    }
    let username = username.trim().to_string();
    let email = email.trim().to_lowercase();

    let mut errors: Vec<FieldError> = [check_username(&username), check_email(&email)]
        .into_iter()
        .flatten()
        .collect();
    if errors.is_empty() {
        if username != current.username
            && User::username_taken(&state.db, &username, Some(user_id))
                .await
                .map_err(internal)?
        {
            errors.push(FieldError::new(
                "username",
                "Username is taken. Please choose another one.",
            ));
        }
        if email != current.email
            && User::email_taken(&state.db, &email, Some(user_id))
                .await
                .map_err(internal)?
        {
            errors.push(FieldError::new(
                "email",
                "Email is taken. Please choose another one.",
            ));
        }
    }
    if !errors.is_empty() {
        return Ok(field_errors(errors));
    }

    // Rejecting a bad upload happens before anything touches the database
    // or the file store.
    let new_image = match &picture {
        Some((file_name, data)) => Some(
            match images::services::save_avatar(&state, data, file_name).await {
                Ok(stored) => stored,
                Err(e) if e.is_client_error() => {
                    return Ok(field_errors(vec![FieldError::new(
                        "picture",
                        e.to_string(),
                    )]))
                }
                Err(e) => {
                    error!(error = %e, "avatar save failed");
                    return Err(internal(e));
                }
            },
        ),
        None => None,
    };

    let password_hash = match &password {
        Some(plain) => Some(hash_password(plain).map_err(internal)?),
        None => None,
    };

    let updated = match User::update_profile(
        &state.db,
        user_id,
        &username,
        &email,
        new_image.as_deref(),
        password_hash.as_deref(),
    )
    .await
    {
        Ok(u) => u,
        Err(UserError::DuplicateUsername) => {
            return Ok(field_errors(vec![FieldError::new(
                "username",
                "Username is taken. Please choose another one.",
            )]))
        }
        Err(UserError::DuplicateEmail) => {
            return Ok(field_errors(vec![FieldError::new(
                "email",
                "Email is taken. Please choose another one.",
            )]))
        }
        Err(UserError::Db(e)) => {
            error!(error = %e, "update profile failed");
            return Err(internal(e));
        }
    };

    // The row now points at the new file; the replaced one is removed
    // best-effort.
    if let Some(new_file) = &new_image {
        if current.image_file != *new_file && current.image_file != "default.jpg" {
            if let Err(e) = state.storage.delete_object(&current.image_file).await {
                warn!(error = %e, file = %current.image_file, "old avatar not removed");
            }
        }
    }

    info!(user_id = %updated.id, "account updated");
    Ok(Json(PublicUser::from_user(&state, &updated)).into_response())
}

#[instrument(skip(state, payload))]
pub async fn reset_request(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    Json(mut payload): Json<ResetRequest>,
) -> Result<Response, (StatusCode, String)> {
    if current.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    payload.email = payload.email.trim().to_lowercase();
    if let Some(err) = check_email(&payload.email) {
        return Ok(field_errors(vec![err]));
    }

    // The response is the same whether or not the account exists.
    if let Some(user) = User::find_by_email(&state.db, &payload.email)
        .await
        .map_err(internal)?
    {
        let keys = SessionKeys::from_ref(&state);
        let token = keys.sign_reset(user.id).map_err(internal)?;
        let link = format!(
            "{}/reset_password/{}",
            state.config.base_url.trim_end_matches('/'),
            token
        );
        let (subject, body) = reset_message(&link);
        if let Err(e) = state.mailer.send(&user.email, &subject, &body).await {
            // Fire-and-forget: the transport owns retry semantics.
            error!(error = %e, user_id = %user.id, "reset mail not sent");
        } else {
            info!(user_id = %user.id, "reset mail sent");
        }
    }

    Ok(Json(json!({
        "message": "If an account with this email exists, a password reset message has been sent."
    }))
    .into_response())
}

#[instrument(skip(state, token))]
pub async fn reset_token_page(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    Path(token): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    if current.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    let keys = SessionKeys::from_ref(&state);
    match keys.verify_reset(&token) {
        Some(_) => Ok(StatusCode::OK.into_response()),
        None => Err((
            StatusCode::BAD_REQUEST,
            "That is an invalid or expired token".into(),
        )),
    }
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Response, (StatusCode, String)> {
    if current.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    let keys = SessionKeys::from_ref(&state);
    let invalid = (
        StatusCode::BAD_REQUEST,
        "That is an invalid or expired token".to_string(),
    );
    let user_id = keys.verify_reset(&token).ok_or(invalid.clone())?;

    if let Some(err) = check_password_pair(&payload.password, &payload.confirm_password) {
        return Ok(field_errors(vec![err]));
    }

    // A token for a vanished user reads the same as a bad token.
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(internal)?
        .ok_or(invalid)?;

    let hash = hash_password(&payload.password).map_err(internal)?;
    User::update_password(&state.db, user.id, &hash)
        .await
        .map_err(internal)?;

    info!(user_id = %user.id, "password reset");
    Ok(Json(json!({ "message": "Your password has been reset. You can now log in." }))
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_shape() {
        let plain = session_cookie("tok", false, 3600);
        assert_eq!(plain, "session=tok; Path=/; HttpOnly; SameSite=Lax");
        let remembered = session_cookie("tok", true, 3600);
        assert!(remembered.ends_with("; Max-Age=3600"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cleared = clear_session_cookie();
        assert!(cleared.starts_with("session=;"));
        assert!(cleared.contains("Max-Age=0"));
    }
}
