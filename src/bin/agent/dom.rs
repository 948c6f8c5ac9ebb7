use anyhow::{Context, Result};
use headless_chrome::Tab;
use serde::Deserialize;

use pagehand::{DomSnapshot, LocatorMap};

/// Helpers shared by the page scripts below. Defines `__ph` on `window`
/// once; later injections are no-ops.
///
/// Candidate elements are interactive controls plus leaf elements carrying
/// visible text. Each is serialized on one line as `id:<tag attrs>text</tag>`
/// and located by an absolute XPath.
const HELPERS_JS: &str = r#"
if (!window.__ph) {
  const INTERACTIVE = new Set(['A','BUTTON','INPUT','TEXTAREA','SELECT','OPTION','DETAILS','SUMMARY','LABEL']);
  const SKIP = new Set(['SCRIPT','STYLE','NOSCRIPT','SVG','LINK','META','TEMPLATE','IFRAME']);
  const ATTRS = ['aria-label','placeholder','name','type','role','title','alt','value'];

  function isVisible(el) {
    const rect = el.getBoundingClientRect();
    if (rect.width === 0 || rect.height === 0) return false;
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0';
  }

  function isInteractive(el) {
    return INTERACTIVE.has(el.tagName) ||
      el.hasAttribute('onclick') ||
      ['button','link','checkbox','tab','menuitem','option','textbox','combobox'].includes(el.getAttribute('role'));
  }

  function isTextLeaf(el) {
    if (el.children.length > 0) return false;
    const text = (el.textContent || '').trim();
    return text.length > 0;
  }

  function xpath(el) {
    if (el.id) return '//*[@id="' + el.id + '"]';
    const parts = [];
    for (let node = el; node && node.nodeType === 1; node = node.parentNode) {
      let index = 1;
      for (let sib = node.previousElementSibling; sib; sib = sib.previousElementSibling) {
        if (sib.tagName === node.tagName) index++;
      }
      parts.unshift(node.tagName.toLowerCase() + '[' + index + ']');
    }
    return '/' + parts.join('/');
  }

  function describe(el) {
    const tag = el.tagName.toLowerCase();
    const attrs = ATTRS
      .filter(a => el.hasAttribute(a) && el.getAttribute(a))
      .map(a => a + '="' + el.getAttribute(a).slice(0, 60) + '"');
    if (tag === 'a' && el.getAttribute('href')) attrs.push('href="' + el.getAttribute('href').slice(0, 80) + '"');
    const text = (el.innerText || el.textContent || '').trim().replace(/\s+/g, ' ').slice(0, 150);
    const open = attrs.length ? '<' + tag + ' ' + attrs.join(' ') + '>' : '<' + tag + '>';
    return open + text + '</' + tag + '>';
  }

  function candidates(top, bottom) {
    const out = [];
    const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_ELEMENT, {
      acceptNode(node) {
        if (SKIP.has(node.tagName)) return NodeFilter.FILTER_REJECT;
        return NodeFilter.FILTER_ACCEPT;
      }
    });
    for (let el = walker.nextNode(); el; el = walker.nextNode()) {
      if (!isInteractive(el) && !isTextLeaf(el)) continue;
      if (!isVisible(el)) continue;
      if (top !== undefined) {
        const y = el.getBoundingClientRect().top + window.scrollY;
        if (y < top || y >= bottom) continue;
      }
      out.push(el);
    }
    return out;
  }

  function encode(elements, chunk, chunks) {
    const lines = [];
    const selectorMap = {};
    elements.forEach((el, index) => {
      lines.push(index + ':' + describe(el));
      selectorMap[index] = xpath(el);
    });
    return JSON.stringify({ outputString: lines.join('\n'), selectorMap, chunk, chunks });
  }

  window.__ph = {
    processDom(chunksSeen) {
      const height = window.innerHeight;
      const total = Math.max(1, Math.ceil(document.documentElement.scrollHeight / height));
      const chunks = Array.from({ length: total }, (_, i) => i);
      const unseen = chunks.filter(c => !chunksSeen.includes(c));
      const chunk = unseen.length ? unseen[0] : chunks[chunks.length - 1];
      const top = chunk * height;
      window.scrollTo(0, top);
      return encode(candidates(top, top + height), chunk, chunks);
    },

    processAllOfDom() {
      return encode(candidates(), 0, [0]);
    },

    annotate(selectorMap) {
      this.clearAnnotations();
      const container = document.createElement('div');
      container.id = '__ph_annotations';
      container.style.cssText = 'position:absolute;top:0;left:0;pointer-events:none;z-index:2147483647';
      const placed = [];
      for (const [id, path] of Object.entries(selectorMap)) {
        const el = document.evaluate(path, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
        if (!el) continue;
        const rect = el.getBoundingClientRect();
        const x = rect.left + window.scrollX;
        const y = rect.top + window.scrollY;
        const box = document.createElement('div');
        box.style.cssText = 'position:absolute;border:2px solid red;left:' + x + 'px;top:' + y + 'px;width:' + rect.width + 'px;height:' + rect.height + 'px';
        let labelY = y - 12;
        while (placed.some(p => Math.abs(p.x - x) < 24 && Math.abs(p.y - labelY) < 24)) labelY += 24;
        placed.push({ x, y: labelY });
        const label = document.createElement('div');
        label.textContent = id;
        label.style.cssText = 'position:absolute;background:white;color:red;border:2px solid red;border-radius:12px;font:bold 14px sans-serif;padding:0 5px;left:' + (x - 12) + 'px;top:' + labelY + 'px';
        container.appendChild(box);
        container.appendChild(label);
      }
      document.body.appendChild(container);
    },

    clearAnnotations() {
      const existing = document.getElementById('__ph_annotations');
      if (existing) existing.remove();
    },

    debugDom(selectorMap, chunk) {
      this.cleanupDebug();
      const container = document.createElement('div');
      container.id = '__ph_debug';
      container.style.cssText = 'position:absolute;top:0;left:0;pointer-events:none;z-index:2147483646';
      for (const path of Object.values(selectorMap)) {
        const el = document.evaluate(path, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
        if (!el) continue;
        const rect = el.getBoundingClientRect();
        const box = document.createElement('div');
        box.style.cssText = 'position:absolute;border:1px dashed #0070f3;background:rgba(0,112,243,0.08);left:' + (rect.left + window.scrollX) + 'px;top:' + (rect.top + window.scrollY) + 'px;width:' + rect.width + 'px;height:' + rect.height + 'px';
        container.appendChild(box);
      }
      const banner = document.createElement('div');
      banner.textContent = 'chunk ' + chunk;
      banner.style.cssText = 'position:absolute;left:0;top:' + window.scrollY + 'px;background:#0070f3;color:white;font:bold 12px monospace;padding:2px 6px';
      container.appendChild(banner);
      document.body.appendChild(container);
    },

    cleanupDebug() {
      const existing = document.getElementById('__ph_debug');
      if (existing) existing.remove();
    },
  };
}
"#;

/// Called on an element: scroll it to the middle of the viewport.
pub const SCROLL_INTO_VIEW_JS: &str =
    "function() { this.scrollIntoView({ behavior: 'smooth', block: 'center' }); }";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    output_string: String,
    selector_map: LocatorMap,
    chunk: usize,
    chunks: Vec<usize>,
}

impl From<RawSnapshot> for DomSnapshot {
    fn from(raw: RawSnapshot) -> Self {
        DomSnapshot {
            encoding: raw.output_string,
            locator_map: raw.selector_map,
            chunk: raw.chunk,
            chunks: raw.chunks,
        }
    }
}

fn evaluate_string(tab: &Tab, expression: &str) -> Result<String> {
    let script = format!("{HELPERS_JS}\n{expression}");
    let result = tab.evaluate(&script, false)?;
    result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .with_context(|| format!("script returned no string: {expression}"))
}

/// Serialize the first chunk not in `chunks_seen`, scrolling to it.
pub fn process_dom(tab: &Tab, chunks_seen: &[usize]) -> Result<DomSnapshot> {
    let seen = serde_json::to_string(chunks_seen)?;
    let raw = evaluate_string(tab, &format!("window.__ph.processDom({seen})"))?;
    let snapshot: RawSnapshot = serde_json::from_str(&raw).context("processDom output")?;
    Ok(snapshot.into())
}

/// Serialize the whole page as a single chunk.
pub fn process_all_dom(tab: &Tab) -> Result<DomSnapshot> {
    let raw = evaluate_string(tab, "window.__ph.processAllOfDom()")?;
    let snapshot: RawSnapshot = serde_json::from_str(&raw).context("processAllOfDom output")?;
    Ok(snapshot.into())
}

pub fn annotate(tab: &Tab, locators: &LocatorMap) -> Result<()> {
    let map = serde_json::to_string(locators)?;
    tab.evaluate(
        &format!("{HELPERS_JS}\nwindow.__ph.annotate({map}); 'ok'"),
        false,
    )?;
    Ok(())
}

pub fn clear_annotations(tab: &Tab) -> Result<()> {
    tab.evaluate(
        &format!("{HELPERS_JS}\nwindow.__ph.clearAnnotations(); 'ok'"),
        false,
    )?;
    Ok(())
}

/// Outline the elements of `chunk` until [`cleanup_debug`] is called.
pub fn debug_dom(tab: &Tab, locators: &LocatorMap, chunk: usize) -> Result<()> {
    let map = serde_json::to_string(locators)?;
    tab.evaluate(
        &format!("{HELPERS_JS}\nwindow.__ph.debugDom({map}, {chunk}); 'ok'"),
        false,
    )?;
    Ok(())
}

pub fn cleanup_debug(tab: &Tab) -> Result<()> {
    tab.evaluate(
        &format!("{HELPERS_JS}\nwindow.__ph.cleanupDebug(); 'ok'"),
        false,
    )?;
    Ok(())
}

pub fn ready_state(tab: &Tab) -> Result<String> {
    let result = tab.evaluate("document.readyState", false)?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "loading".to_string()))
}

pub fn scroll_to_top(tab: &Tab) -> Result<()> {
    tab.evaluate("window.scrollTo(0, 0)", false)?;
    Ok(())
}

/// Width and height of the whole document, for full-page screenshots.
pub fn document_size(tab: &Tab) -> Result<(f64, f64)> {
    let raw = evaluate_string(
        tab,
        "JSON.stringify([document.documentElement.scrollWidth, document.documentElement.scrollHeight])",
    )?;
    let [width, height]: [f64; 2] = serde_json::from_str(&raw)?;
    Ok((width, height))
}
