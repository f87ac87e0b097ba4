/// Money is stored and transmitted as integer centavos (1 real = 100 centavos).
/// These helpers only exist for presentation.

/// Format centavos as a Brazilian real string, e.g. `R$ 1.234,56`.
pub fn format_cents_as_brl(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let reais = (cents / 100).to_string();

    let mut grouped = String::with_capacity(reais.len() + reais.len() / 3);
    for (i, digit) in reais.chars().enumerate() {
        if i > 0 && (reais.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    format!("{}R$ {},{:02}", sign, grouped, cents % 100)
}
