use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{CredentialValidator, ADMINISTRATOR_ROLE};
use crate::configuration::{JwtSettings, PasswordSettings};
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    change_password, create_role, delete_role, delete_user, get_profile, get_role, get_user,
    health_check, list_roles, list_users, login, logout, refresh, register, update_profile,
    update_role, update_user,
};
use crate::store::IdentityStore;

/// Build the HTTP server on an already bound listener
///
/// # Errors
/// Returns an I/O error if the listener cannot be used, or if the password
/// settings are unusable (the credential validator hashes at startup).
pub fn run(
    listener: TcpListener,
    store: Arc<dyn IdentityStore>,
    jwt_config: JwtSettings,
    password_settings: PasswordSettings,
) -> Result<Server, std::io::Error> {
    let validator = CredentialValidator::new(store.clone(), &password_settings)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    let validator = web::Data::new(validator);
    let store: web::Data<dyn IdentityStore> = web::Data::from(store);
    let jwt_config_data = web::Data::new(jwt_config.clone());
    let password_data = web::Data::new(password_settings);

    let server = HttpServer::new(move || {
        let authenticated = JwtMiddleware::new(jwt_config.clone());
        let administrator = || JwtMiddleware::new(jwt_config.clone()).require_role(ADMINISTRATOR_ROLE);

        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(store.clone())
            .app_data(validator.clone())
            .app_data(jwt_config_data.clone())
            .app_data(password_data.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                tracing::warn!(error = %err, "Rejected request body");
                AppError::Validation(ValidationError::InvalidFormat("body".to_string())).into()
            }))

            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/account")
                    // Public: registration and the cookie session protocol
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::get().to(refresh))
                    .route("/logout", web::get().to(logout))
                    // Signed-in user
                    .service(
                        web::scope("/profile")
                            .wrap(authenticated)
                            .route("", web::get().to(get_profile))
                            .route("/update", web::put().to(update_profile))
                            .route("/changepassword", web::put().to(change_password)),
                    )
                    // Administrator
                    .service(
                        web::resource("")
                            .wrap(administrator())
                            .route(web::get().to(list_users)),
                    )
                    .service(
                        web::resource("/{id}")
                            .wrap(administrator())
                            .route(web::get().to(get_user))
                            .route(web::put().to(update_user))
                            .route(web::delete().to(delete_user)),
                    ),
            )
            .service(
                web::scope("/api/roles")
                    .wrap(administrator())
                    .route("", web::get().to(list_roles))
                    .route("", web::post().to(create_role))
                    .route("/{id}", web::get().to(get_role))
                    .route("/{id}", web::put().to(update_role))
                    .route("/{id}", web::delete().to(delete_role)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
