// src/render/template.rs
use crate::config::PluginConfig;
use crate::portrait::Portrait;

const OPTION_TOPS: [f64; 4] = [0.20, 0.34, 0.48, 0.62];
const OPTION_STEP: f64 = 0.14;

/// Pixel positions of the scene elements for a given canvas size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneLayout {
    pub width: u32,
    pub height: u32,
    pub quote_width: u32,
    pub quote_top: u32,
    pub glass_left: u32,
    pub glass_top: u32,
    pub glass_width: u32,
    pub glass_height: u32,
    pub option_width: u32,
}

fn fraction(total: u32, f: f64) -> u32 {
    (total as f64 * f) as u32
}

impl SceneLayout {
    pub fn new(width: u32, height: u32) -> Self {
        let third_option = fraction(height, OPTION_TOPS[2]);
        let quote_top = (third_option + 110).max(fraction(height, 0.68));
        Self {
            width,
            height,
            quote_width: fraction(width, 0.86),
            quote_top,
            glass_left: 24,
            glass_top: quote_top,
            glass_width: width.saturating_sub(48),
            glass_height: height.saturating_sub(quote_top).max(120),
            option_width: fraction(width, 0.7),
        }
    }

    /// Top offset of the option at `index`; the first four slots are fixed and
    /// later ones continue with the same spacing
    pub fn option_top(&self, index: usize) -> u32 {
        let f = match OPTION_TOPS.get(index) {
            Some(f) => *f,
            None => OPTION_TOPS[3] + OPTION_STEP * (index - 3) as f64,
        };
        fraction(self.height, f)
    }
}

/// Everything shown in one rendered scene
pub struct Scene<'a> {
    pub background: Option<String>,
    pub avatar_url: &'a str,
    pub display_name: &'a str,
    pub quote: &'a str,
    pub options: &'a [String],
    pub portrait: Option<&'a Portrait>,
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Make a URL safe to place inside CSS `url('...')`
fn css_url(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("%27"),
            '"' => out.push_str("%22"),
            '\\' => out.push_str("%5C"),
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            c if c.is_whitespace() => out.push_str("%20"),
            c => out.push(c),
        }
    }
    out
}

/// HTML document for the external renderer. Name, quote and options are escaped.
pub fn render_html(scene: &Scene<'_>, cfg: &PluginConfig) -> String {
    let layout = SceneLayout::new(cfg.canvas_width, cfg.canvas_height);
    let width = layout.width;
    let height = layout.height;

    let bg_url = css_url(scene.background.as_deref().unwrap_or_default());
    let avatar = css_url(scene.avatar_url);
    let (char_src, char_transparent) = match scene.portrait {
        Some(portrait) => (portrait.image.to_string(), portrait.transparent),
        None => (String::new(), false),
    };
    let char_blend = if char_transparent { "" } else { "mix-blend-mode: multiply;" };
    let char_opacity = if scene.portrait.is_some() { "1.0" } else { "0" };
    let char_width = (width as f32 * cfg.character_scale) as u32;

    let option_rules: String = (0..scene.options.len())
        .map(|i| format!("  .opt{} {{ top:{}px; }}\n", i + 1, layout.option_top(i)))
        .collect();
    let option_divs: String = scene
        .options
        .iter()
        .enumerate()
        .map(|(i, opt)| format!("<div class='option opt{}'>{}</div>", i + 1, escape_html(opt)))
        .collect();

    format!(
        r#"
<html>
<head>
<meta charset='utf-8'/>
<style>
  body {{ margin:0; width:{width}px; height:{height}px; font-family: 'Microsoft Yahei', sans-serif; }}
  .root {{ position:relative; width:{width}px; height:{height}px; background:#000; overflow:hidden; }}
  .bg-blur {{ position:absolute; inset:0; background-image:url('{bg_url}'); background-size:cover; background-position:center; filter:blur(18px) brightness(0.7); transform:scale(1.06); z-index:0; }}
  .bg-main {{ position:absolute; inset:0; background-image:url('{bg_url}'); background-repeat:no-repeat; background-size:contain; background-position:center; z-index:0; }}
  .topbar {{ position:absolute; left:24px; top:18px; color:#fff; font-weight:700; letter-spacing:1px; text-shadow:0 2px 6px rgba(0,0,0,.6); }}
  :root {{ --quote-width: {quote_width}px; }}
  .char {{ position:absolute; left:calc(50% + {x_offset}px); transform:translateX(-50%); bottom:{bottom}px; width:{char_width}px; height:auto; object-fit:contain; {char_blend} filter: drop-shadow(0 8px 24px rgba(0,0,0,.45)); opacity:{char_opacity}; z-index: 1; pointer-events:none; }}
  .quote {{ position:absolute; left:50%; transform:translateX(-50%); top:{quote_top}px; width:var(--quote-width); padding:18px 22px 22px 22px; color:#fff; font-size:28px; font-weight:800; line-height:1.5; border-radius:16px; background:transparent; text-align:center; z-index:3; }}
  .glass {{ position:absolute; left:{glass_left}px; top:{glass_top}px; width:{glass_width}px; height:{glass_height}px; background:rgba(0,0,0,.25); backdrop-filter: blur(10px); border-radius:18px; box-shadow:0 10px 30px rgba(0,0,0,.35); z-index:2; }}
  .q-avatar {{ position:absolute; left:16px; top:16px; width:56px; height:56px; border-radius:50%; border:2px solid rgba(255,255,255,.8); background-image:url('{avatar}'); background-size:cover; background-position:center; box-shadow:0 4px 12px rgba(0,0,0,.4); z-index:3; }}
  .q-user {{ position:absolute; left:88px; top:22px; font-size:22px; font-weight:800; color:#fff; text-shadow:0 2px 6px rgba(0,0,0,.6); z-index:3; }}
  .q-text {{ margin-top:88px; font-size:32px; font-weight:900; color:#fff; text-align:center; line-height:1.6; z-index:3; position:relative; }}
  .option {{ position:absolute; left:50%; transform:translateX(-50%); width:{option_width}px; padding:14px 18px; background:rgba(0,0,0,.55); color:#f0f0f0; border-radius:28px; text-align:center; font-size:26px; font-weight:800; letter-spacing:1px; box-shadow:0 8px 20px rgba(0,0,0,.35); border:1px solid rgba(255,255,255,.15); z-index:3; }}
{option_rules}</style>
</head>
<body>
  <div class='root'>
    <div class='bg-blur'></div>
    <div class='bg-main'></div>
    <div class='topbar'>CHAPTER</div>
    <img class='char' src='{char_src}' />
    <div class='glass'></div>
    <div class='quote'>
      <div class='q-avatar'></div>
      <div class='q-user'>{name}</div>
      <div class='q-text'>{quote}</div>
    </div>
    {option_divs}
  </div>
</body>
</html>
"#,
        quote_width = layout.quote_width,
        x_offset = cfg.character_x_offset,
        bottom = cfg.character_bottom_offset,
        quote_top = layout.quote_top,
        glass_left = layout.glass_left,
        glass_top = layout.glass_top,
        glass_width = layout.glass_width,
        glass_height = layout.glass_height,
        option_width = layout.option_width,
        char_src = escape_html(&char_src),
        name = escape_html(scene.display_name),
        quote = escape_html(scene.quote),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portrait::data_url::DataUrl;

    fn scene<'a>(options: &'a [String], portrait: Option<&'a Portrait>) -> Scene<'a> {
        Scene {
            background: None,
            avatar_url: "https://q1.qlogo.cn/g?b=qq&nk=1&s=640",
            display_name: "<b>Mallory</b> (1)",
            quote: "a & b",
            options,
            portrait,
        }
    }

    #[test]
    fn layout_matches_default_canvas() {
        let layout = SceneLayout::new(1280, 720);
        assert_eq!(layout.option_top(0), 144);
        assert_eq!(layout.option_top(1), 244);
        assert_eq!(layout.option_top(2), 345);
        assert_eq!(layout.option_top(3), 446);
        assert_eq!(layout.quote_width, 1100);
        assert_eq!(layout.quote_top, 489);
        assert_eq!(layout.glass_width, 1232);
        assert_eq!(layout.glass_height, 231);
        assert_eq!(layout.option_width, 896);
    }

    #[test]
    fn glass_keeps_minimum_height() {
        let layout = SceneLayout::new(40, 200);
        assert_eq!(layout.quote_top, 206);
        assert_eq!(layout.glass_height, 120);
        assert_eq!(layout.glass_width, 0);
    }

    #[test]
    fn extra_options_continue_spacing() {
        let layout = SceneLayout::new(1000, 1000);
        assert_eq!(layout.option_top(4), 760);
    }

    #[test]
    fn user_text_is_escaped() {
        let options = vec!["A. <script>alert(1)</script>".to_string()];
        let html = render_html(&scene(&options, None), &PluginConfig::default());
        assert!(html.contains("&lt;b&gt;Mallory&lt;/b&gt; (1)"));
        assert!(html.contains("a &amp; b"));
        assert!(html.contains("A. &lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("<div class='option opt1'>"));
        assert!(html.contains(".opt1 { top:144px; }"));
    }

    #[test]
    fn opaque_portrait_is_multiplied() {
        let options = vec!["A. x".to_string()];
        let opaque = Portrait {
            image: DataUrl::new("image/jpeg", vec![1]),
            transparent: false,
        };
        let html = render_html(&scene(&options, Some(&opaque)), &PluginConfig::default());
        assert!(html.contains("mix-blend-mode: multiply;"));
        assert!(html.contains("opacity:1.0;"));
        assert!(html.contains("src='data:image/jpeg;base64,AQ=='"));

        let keyed = Portrait {
            image: DataUrl::png(vec![1]),
            transparent: true,
        };
        let html = render_html(&scene(&options, Some(&keyed)), &PluginConfig::default());
        assert!(!html.contains("mix-blend-mode"));
    }

    #[test]
    fn missing_portrait_is_hidden() {
        let options = vec!["A. x".to_string()];
        let html = render_html(&scene(&options, None), &PluginConfig::default());
        assert!(html.contains("opacity:0;"));
        assert!(html.contains("width:537px;"));
    }

    #[test]
    fn css_urls_cannot_break_out() {
        assert_eq!(css_url("a') b"), "a%27%29%20b");
    }
}
