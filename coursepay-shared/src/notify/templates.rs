/// Email templates (pt-BR)
///
/// Two messages are sent by the pipeline:
///
/// - "order created", right after checkout, with method-specific next steps
/// - "payment approved", once per true approval transition
///
/// Interpolated user and catalog text is HTML-escaped.

use super::EmailMessage;
use crate::models::{Course, Order, PaymentMethod, User};

const SUPPORT_EMAIL: &str = "suporte@globaltrainer.com.br";

/// Formats a cent amount as Brazilian reais, e.g. `R$ 199,90`
pub fn format_brl(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}R$ {},{:02}", cents / 100, cents % 100)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

fn next_steps(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Pix => {
            "<p><strong>Próximos passos para PIX:</strong></p>\
             <p>Você receberá em breve um e-mail com o código PIX e QR Code para realizar o pagamento.</p>"
        }
        PaymentMethod::Boleto => {
            "<p><strong>Próximos passos para Boleto:</strong></p>\
             <p>Você receberá em breve um e-mail com o boleto bancário para pagamento.</p>"
        }
        PaymentMethod::CreditCard => {
            "<p><strong>Pagamento com Cartão:</strong></p>\
             <p>Seu pagamento está sendo processado. Você receberá uma confirmação em breve.</p>"
        }
    }
}

fn layout(title: &str, content: &str) -> String {
    format!(
        "<!DOCTYPE html>\
         <html lang=\"pt-BR\"><head><meta charset=\"UTF-8\"><title>{title} - Global Trainer</title></head>\
         <body style=\"font-family: Arial, sans-serif; color: #333;\">\
         <div style=\"max-width: 600px; margin: 0 auto;\">\
         <h1>Global Trainer</h1><h2>{title}</h2>\
         {content}\
         <p style=\"color: #666;\">Dúvidas? Entre em contato: {SUPPORT_EMAIL}</p>\
         </div></body></html>"
    )
}

/// "Order created" email, sent after checkout
pub fn order_created(user: &User, course: &Course, order: &Order, app_url: &str) -> EmailMessage {
    let content = format!(
        "<p>Olá <strong>{name}</strong>,</p>\
         <p>Recebemos seu pedido com sucesso! Aqui estão os detalhes:</p>\
         <p><strong>Pedido:</strong> #{number}</p>\
         <p><strong>Curso:</strong> {title}</p>\
         <p><strong>Instrutor:</strong> {instructor}</p>\
         <p><strong>Valor:</strong> {amount}</p>\
         <p><strong>Método de Pagamento:</strong> {method}</p>\
         <p><strong>Status:</strong> Aguardando Pagamento</p>\
         {steps}\
         <p>Assim que o pagamento for confirmado, você receberá acesso imediato ao curso!</p>\
         <a href=\"{app_url}/student/dashboard\">Acessar Minha Área</a>",
        name = escape(&user.name),
        number = order.display_number(),
        title = escape(&course.title),
        instructor = escape(&course.instructor),
        amount = format_brl(order.amount),
        method = order.payment_method.label(),
        steps = next_steps(order.payment_method),
        app_url = app_url.trim_end_matches('/'),
    );

    EmailMessage {
        to: user.email.clone(),
        subject: format!("Confirmação de Pedido - {}", course.title),
        html: layout("Confirmação de Pedido", &content),
    }
}

/// "Payment approved" email, sent once the order reaches approved
pub fn payment_approved(user: &User, course: &Course, order: &Order, app_url: &str) -> EmailMessage {
    let app_url = app_url.trim_end_matches('/');
    let content = format!(
        "<p>Parabéns <strong>{name}</strong>!</p>\
         <p>Seu pagamento foi aprovado com sucesso!</p>\
         <p><strong>Valor pago:</strong> {amount}</p>\
         <p><strong>Pedido:</strong> #{number}</p>\
         <p><strong>Curso:</strong> {title}</p>\
         <p><strong>Instrutor:</strong> {instructor}</p>\
         <p>Você já pode começar a estudar!</p>\
         <a href=\"{app_url}/student/courses/{course_id}\">Acessar Curso Agora</a>\
         <p>Você também pode acessar todos os seus cursos na sua área do aluno.</p>\
         <a href=\"{app_url}/student/dashboard\">Minha Área do Aluno</a>",
        name = escape(&user.name),
        amount = format_brl(order.amount),
        number = order.display_number(),
        title = escape(&course.title),
        instructor = escape(&course.instructor),
        course_id = escape(&course.id),
    );

    EmailMessage {
        to: user.email.clone(),
        subject: format!("Pagamento Aprovado - {}", course.title),
        html: layout("Pagamento Aprovado!", &content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateOrder, CreateUser};

    fn fixtures(method: PaymentMethod) -> (User, Course, Order) {
        let user = User::new(CreateUser {
            id: "u1".to_string(),
            email: "a@b.com".to_string(),
            name: "Ana <admin>".to_string(),
        });
        let course = Course::new("c1", "Rust & Tokio", "Ferris", 25000);
        let order = Order::new(CreateOrder {
            user_id: "u1".to_string(),
            course_id: "c1".to_string(),
            amount: 19990,
            payment_method: method,
        });
        (user, course, order)
    }

    #[test]
    fn test_format_brl() {
        assert_eq!(format_brl(19990), "R$ 199,90");
        assert_eq!(format_brl(5), "R$ 0,05");
        assert_eq!(format_brl(100000), "R$ 1000,00");
    }

    #[test]
    fn test_order_created_content() {
        let (user, course, order) = fixtures(PaymentMethod::Pix);
        let email = order_created(&user, &course, &order, "https://shop.example/");

        assert_eq!(email.to, "a@b.com");
        assert_eq!(email.subject, "Confirmação de Pedido - Rust & Tokio");
        assert!(email.html.contains(&format!("#{}", order.display_number())));
        assert!(email.html.contains("R$ 199,90"));
        assert!(email.html.contains("Próximos passos para PIX"));
        assert!(email.html.contains("https://shop.example/student/dashboard"));
        // order amount, not catalog price
        assert!(!email.html.contains("R$ 250,00"));
    }

    #[test]
    fn test_user_text_is_escaped() {
        let (user, course, order) = fixtures(PaymentMethod::Boleto);
        let email = order_created(&user, &course, &order, "https://shop.example");

        assert!(email.html.contains("Ana &lt;admin&gt;"));
        assert!(email.html.contains("Rust &amp; Tokio"));
        assert!(email.html.contains("Boleto Bancário"));
    }

    #[test]
    fn test_payment_approved_links_course() {
        let (user, course, order) = fixtures(PaymentMethod::CreditCard);
        let email = payment_approved(&user, &course, &order, "https://shop.example");

        assert_eq!(email.subject, "Pagamento Aprovado - Rust & Tokio");
        assert!(email.html.contains("https://shop.example/student/courses/c1"));
        assert!(email.html.contains("Ferris"));
    }
}
