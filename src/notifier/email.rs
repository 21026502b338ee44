//! Rendering of the pt-BR expiration email.

use chrono::{DateTime, Utc};

use crate::config::NotificationsConfig;

pub const EXPIRATION_SUBJECT: &str = "❌ Sua dedicatória expirou - Renove agora";

/// A rendered email, ready to hand to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationEmail {
    pub subject: String,
    pub html: String,
}

/// Format a timestamp as `dd/mm/yyyy` in UTC.
pub fn format_pt_br_date(at: DateTime<Utc>) -> String {
    at.format("%d/%m/%Y").to_string()
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "\
.email-container { max-width: 650px; margin: 0 auto; font-family: 'Poppins', Arial, sans-serif; background: #ffffff; border-radius: 16px; overflow: hidden; } \
.header { background: linear-gradient(135deg, #6a11cb 0%, #2575fc 100%); padding: 40px 30px; text-align: center; color: white; } \
.content { padding: 40px 30px; color: #333333; line-height: 1.6; } \
.expired-info { background: #fff8f8; border-left: 4px solid #ff6b6b; padding: 20px; border-radius: 0 8px 8px 0; margin: 25px 0; } \
.cta-container { text-align: center; margin: 40px 0; } \
.cta-button { display: inline-block; padding: 18px 45px; background: #27ae60; color: white !important; text-decoration: none; font-weight: 600; font-size: 18px; border-radius: 50px; } \
.contact { background: #f0f7ff; border-radius: 12px; padding: 25px; text-align: center; margin: 30px 0; } \
.footer { background: #f8f9fa; padding: 25px; text-align: center; color: #6c757d; font-size: 13px; }";

/// Render the expiration email for a template id and expiration instant.
pub fn render_expiration_email(
    config: &NotificationsConfig,
    template_id: &str,
    expires_at: DateTime<Utc>,
) -> ExpirationEmail {
    let label = escape_html(config.template_label(template_id));
    let date = format_pt_br_date(expires_at);
    let renew_url = escape_html(&config.renewal_url());
    let brand = escape_html(&config.brand_name);
    let help_contact = config
        .reply_to
        .as_deref()
        .map(|addr| {
            format!(
                "<p>Entre em contato: <strong>{}</strong></p>",
                escape_html(addr)
            )
        })
        .unwrap_or_default();

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Sua dedicatória expirou</title>
    <style>{STYLE}</style>
</head>
<body style="margin: 0; padding: 20px; background: #f5f7ff;">
    <div class="email-container">
        <div class="header">
            <h1>📅 Sua dedicatória expirou!</h1>
            <p>Renove agora para manter sua mensagem especial disponível</p>
        </div>
        <div class="content">
            <p>Olá,</p>
            <div class="expired-info">
                <p>Sua dedicatória no modelo <strong>{label}</strong> expirou em <strong>{date}</strong>.</p>
            </div>
            <div class="cta-container">
                <p>Renove agora e mantenha sua dedicatória ativa por mais 1 ano!</p>
                <a href="{renew_url}" class="cta-button">RENOVAR MINHA DEDICATÓRIA</a>
            </div>
            <div class="contact">
                <h3>Precisa de ajuda?</h3>
                <p>Estamos aqui para te ajudar com qualquer dúvida ou problema!</p>
                {help_contact}
            </div>
        </div>
        <div class="footer">
            <p>{brand}</p>
            <p>Este é um e-mail automático. Por favor não responda diretamente.</p>
        </div>
    </div>
</body>
</html>"#
    );

    ExpirationEmail {
        subject: EXPIRATION_SUBJECT.to_string(),
        html,
    }
}
