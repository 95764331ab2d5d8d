//! Basic automation-hiding scripts, evaluated after each navigation.

use tracing::debug;

use super::BrowserContext;

pub const STEALTH_SCRIPTS: &[&str] = &[
    // navigator.webdriver is the first thing bot checks look at
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    r#"
    window.chrome = window.chrome || { runtime: {}, app: {} };
    "#,
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });
    "#,
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' }
        ],
        configurable: true
    });
    "#,
];

/// Evaluate every stealth script; failures are ignored. Returns how many ran.
pub async fn apply(ctx: &mut dyn BrowserContext) -> usize {
    let mut applied = 0;
    for script in STEALTH_SCRIPTS {
        match ctx.evaluate(script).await {
            Ok(_) => applied += 1,
            Err(e) => debug!("Stealth script skipped: {}", e),
        }
    }
    applied
}
