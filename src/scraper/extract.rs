use super::SectionError;
use crate::models::{
    RawAnalystRow, RawBoxValue, RawComparison, RawEarnings, RawFragment, RawFundamentalsOverview,
    RawReport, RawShareBox, RawSummary, RawValuationTab,
};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Pulls raw text fragments out of a rendered section page. Nothing is
/// cleaned here; a missing required container is an error so the section
/// can be retried.
pub trait FragmentExtractor: Send + Sync {
    fn label_value_pairs(&self, markup: &str, container: &str) -> Result<Vec<RawFragment>, SectionError>;
    fn summary(&self, markup: &str) -> Result<RawSummary, SectionError>;
    fn earnings(&self, markup: &str) -> Result<RawEarnings, SectionError>;
    fn fundamentals_overview(&self, markup: &str) -> Result<RawFundamentalsOverview, SectionError>;
    fn financial_report(&self, markup: &str, name: &str) -> Result<RawReport, SectionError>;
    fn valuation_tab(&self, markup: &str, tab: &str) -> Result<RawValuationTab, SectionError>;
    fn analysts(&self, markup: &str) -> Result<Vec<RawAnalystRow>, SectionError>;
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn sel(css: &str) -> Result<Selector, SectionError> {
    Selector::parse(css).map_err(|e| SectionError::Markup(format!("selector {:?}: {:?}", css, e)))
}

/// Non-empty, trimmed text nodes of an element.
fn segments(el: ElementRef<'_>) -> Vec<String> {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn text(el: ElementRef<'_>) -> String {
    segments(el).join(" ")
}

fn first<'a>(root: ElementRef<'a>, css: &str) -> Result<Option<ElementRef<'a>>, SectionError> {
    Ok(root.select(&sel(css)?).next())
}

fn required<'a>(root: ElementRef<'a>, css: &str) -> Result<ElementRef<'a>, SectionError> {
    first(root, css)?.ok_or_else(|| SectionError::Markup(format!("{} not found", css)))
}

fn all<'a>(root: ElementRef<'a>, css: &str) -> Result<Vec<ElementRef<'a>>, SectionError> {
    Ok(root.select(&sel(css)?).collect())
}

fn class_list(el: ElementRef<'_>) -> Vec<String> {
    el.value()
        .attr("class")
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

// ── HTML extractor ────────────────────────────────────────────────────────────

const EARNINGS_MODULE: &str = r#"div[data-module-name="EarningsAnalysisModule"]"#;
const SHARE_DETAIL_MODULE: &str = r#"div[data-module-name="HistoricGrowthAndShareDetailModule"]"#;
const STATEMENT_MODULE: &str = r#"div[data-module-name="FinancialStatementModule"]"#;
const VALUATION_MODULE: &str = r#"div[data-module-name="StocksValuationModule"]"#;
const PROVIDER_ROWS: &str = "table.ui-table.provider-table tbody tr";

/// Selectors for the research site's section markup.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }

    fn share_box(b: ElementRef<'_>) -> Result<RawShareBox, SectionError> {
        let title = first(b, "h4")?.map(text).unwrap_or_default();
        let historic = title.trim() == crate::sections::fundamentals::HISTORIC_GROWTH_BOX;

        // The first dt is the box heading row.
        let labels = all(b, "dt")?
            .into_iter()
            .skip(1)
            .filter_map(|dt| segments(dt).into_iter().next())
            .collect();

        let mut values = Vec::new();
        for dd in all(b, "dd")? {
            let value = if historic {
                RawBoxValue {
                    attr: first(dd, "label")?
                        .and_then(|l| l.value().attr("data-value"))
                        .map(str::to_string),
                    text: first(dd, "span")?.map(text),
                }
            } else {
                RawBoxValue {
                    attr: dd.value().attr("data-rawvalue").map(str::to_string),
                    text: Some(text(dd)),
                }
            };
            values.push(value);
        }

        Ok(RawShareBox { title, labels, values })
    }
}

impl FragmentExtractor for HtmlExtractor {
    fn label_value_pairs(&self, markup: &str, container: &str) -> Result<Vec<RawFragment>, SectionError> {
        let doc = Html::parse_document(markup);
        let root = required(doc.root_element(), container)?;

        let dts = all(root, "dt")?;
        let dds = all(root, "dd")?;
        if dts.len() != dds.len() {
            debug!("{} labels but {} values under {}", dts.len(), dds.len(), container);
        }

        Ok(dts
            .into_iter()
            .zip(dds)
            .map(|(dt, dd)| {
                let mut parts = segments(dt).into_iter();
                let label = parts.next().unwrap_or_default();
                RawFragment::new(label, text(dd)).with_aux(parts.collect())
            })
            .collect())
    }

    fn summary(&self, markup: &str) -> Result<RawSummary, SectionError> {
        let fragments = self.label_value_pairs(markup, "body")?;
        if fragments.is_empty() {
            return Err(SectionError::Markup("summary has no fields".into()));
        }
        Ok(RawSummary { fragments })
    }

    fn earnings(&self, markup: &str) -> Result<RawEarnings, SectionError> {
        let doc = Html::parse_document(markup);
        let module = required(doc.root_element(), EARNINGS_MODULE)?;

        let next_announcement = first(module, "td.value.week-of")?.map(text);
        let analyst_label = all(module, "td.label")?.get(1).map(|el| text(*el));

        let tooltips = match first(module, "div#main-chart-wrapper")? {
            Some(chart) => all(chart, "div.ui-tooltip")?.into_iter().map(segments).collect(),
            None => {
                debug!("earnings chart not present");
                Vec::new()
            }
        };

        Ok(RawEarnings {
            next_announcement,
            analyst_label,
            tooltips,
        })
    }

    fn fundamentals_overview(&self, markup: &str) -> Result<RawFundamentalsOverview, SectionError> {
        let doc = Html::parse_document(markup);
        let root = doc.root_element();

        let ratio_list = required(root, "div.ui-description-list")?;
        let ratios = all(ratio_list, "dt")?
            .into_iter()
            .zip(all(ratio_list, "dd")?)
            .map(|(dt, dd)| {
                let value = dd
                    .value()
                    .attr("data-rawvalue")
                    .map(str::to_string)
                    .unwrap_or_else(|| text(dd));
                (text(dt), value)
            })
            .collect();

        let (five_year_markers, periods) = match first(root, "div.price-history-chart")? {
            Some(chart) => (
                all(chart, "div.marker.hideOnHover")?.into_iter().map(text).collect(),
                all(chart, "div.period")?.into_iter().map(segments).collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        let share_boxes = match first(root, SHARE_DETAIL_MODULE)? {
            Some(module) => all(module, "div.col-xs-4")?
                .into_iter()
                .map(Self::share_box)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(RawFundamentalsOverview {
            ratios,
            five_year_markers,
            periods,
            share_boxes,
        })
    }

    fn financial_report(&self, markup: &str, name: &str) -> Result<RawReport, SectionError> {
        let doc = Html::parse_document(markup);
        let module = required(doc.root_element(), STATEMENT_MODULE)?;

        let headers = all(module, "th[scope=col]")?
            .into_iter()
            .map(|th| {
                let mut parts = segments(th).into_iter();
                (parts.next().unwrap_or_default(), parts.next().unwrap_or_default())
            })
            .collect();

        let td = sel("td")?;
        let view = required(doc.root_element(), "div.row.contain.data-view")?;
        let rows = all(view, "tr")?
            .into_iter()
            .skip(1)
            .map(|tr| {
                let label = segments(tr).into_iter().next().unwrap_or_default();
                let cells = tr.select(&td).map(text).collect();
                (label, cells)
            })
            .collect();

        Ok(RawReport {
            name: name.to_string(),
            headers,
            rows,
        })
    }

    fn valuation_tab(&self, markup: &str, tab: &str) -> Result<RawValuationTab, SectionError> {
        let doc = Html::parse_document(markup);
        let module = required(doc.root_element(), VALUATION_MODULE)?;

        // The first definition link is the module heading.
        let metrics: Vec<String> = all(module, "a.definition-link")?
            .into_iter()
            .skip(1)
            .map(text)
            .collect();
        let compares = all(doc.root_element(), "td.data-compare")?;

        let mut rows = Vec::new();
        for (metric, td) in metrics.into_iter().zip(compares) {
            let columns = all(td, "dt")?
                .into_iter()
                .zip(all(td, "dd")?)
                .map(|(dt, dd)| (text(dt), text(dd)))
                .collect();
            rows.push(RawComparison { metric, columns });
        }

        Ok(RawValuationTab {
            name: tab.to_string(),
            rows,
        })
    }

    fn analysts(&self, markup: &str) -> Result<Vec<RawAnalystRow>, SectionError> {
        let doc = Html::parse_document(markup);
        let root = doc.root_element();
        required(root, "table.ui-table.provider-table")?;

        let div = sel("div")?;
        let mut rows = Vec::new();
        for tr in all(root, PROVIDER_ROWS)? {
            let rating_since = first(tr, "p.rating-since")?.map(text);
            rows.push(RawAnalystRow {
                div_classes: tr.select(&div).map(class_list).collect(),
                rating_since,
            });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = r#"<html><body><dl>
        <dt>Closing Price</dt><dd>$150.25</dd>
        <dt>Volume<span>12,345,678</span></dt><dd>--</dd>
        <dt>Day's Change</dt><dd><span>+1.25</span><span>(+0.84%)</span></dd>
    </dl></body></html>"#;

    #[test]
    fn test_summary_pairs() {
        let s = HtmlExtractor.summary(SUMMARY).unwrap();
        assert_eq!(s.fragments.len(), 3);
        assert_eq!(s.fragments[0], RawFragment::new("Closing Price", "$150.25"));
        assert_eq!(s.fragments[1].aux, vec!["12,345,678".to_string()]);
        assert_eq!(s.fragments[2].value, "+1.25 (+0.84%)");
    }

    #[test]
    fn test_missing_container_is_markup_error() {
        let err = HtmlExtractor.earnings("<html><body></body></html>").unwrap_err();
        assert!(matches!(err, SectionError::Markup(_)));
        assert!(HtmlExtractor.summary("<html><body></body></html>").is_err());
    }

    #[test]
    fn test_earnings_tooltips() {
        let html = r#"<div data-module-name="EarningsAnalysisModule">
            <table><tr><td class="label bordered">Next</td><td class="value week-of">01/27/2022</td>
            <td class="label">Based on 12 analysts</td></tr></table>
            <div id="main-chart-wrapper">
              <div class="ui-tooltip"><b>2021</b><span>Beat</span><span>Actual:</span><span>$1.20</span><span>Estimate range: $1.00 - $1.10</span></div>
            </div></div>"#;
        let e = HtmlExtractor.earnings(html).unwrap();
        assert_eq!(e.next_announcement.as_deref(), Some("01/27/2022"));
        assert_eq!(e.analyst_label.as_deref(), Some("Based on 12 analysts"));
        assert_eq!(e.tooltips.len(), 1);
        assert_eq!(e.tooltips[0].len(), 5);
        assert_eq!(e.tooltips[0][1], "Beat");
    }

    #[test]
    fn test_share_boxes() {
        let html = r#"<div class="ui-description-list"><dl><dt>P/E</dt><dd data-rawvalue="24.5">24.50</dd></dl></div>
            <div data-module-name="HistoricGrowthAndShareDetailModule">
              <div class="col-xs-4"><h4>Historic Growth</h4><dl>
                <dt>Header</dt><dt>EPS<span>(5yr)</span></dt>
                <dd><label data-value="12.0">12%</label></dd></dl></div>
              <div class="col-xs-4"><h4>Short Interest</h4><dl>
                <dt>Header</dt><dt>Percent of Float</dt>
                <dd>2.0%</dd></dl></div>
            </div>"#;
        let o = HtmlExtractor.fundamentals_overview(html).unwrap();
        assert_eq!(o.ratios, vec![("P/E".to_string(), "24.5".to_string())]);
        assert_eq!(o.share_boxes.len(), 2);
        assert_eq!(o.share_boxes[0].labels, vec!["EPS".to_string()]);
        assert_eq!(o.share_boxes[0].values[0].attr.as_deref(), Some("12.0"));
        assert_eq!(o.share_boxes[1].values[0].attr, None);
        assert_eq!(o.share_boxes[1].values[0].text.as_deref(), Some("2.0%"));
    }

    #[test]
    fn test_report_grid() {
        let html = r#"<div data-module-name="FinancialStatementModule"><table><tr>
              <th scope="col"><span>2020</span><span>12/31/2020</span></th>
              <th scope="col"><span>2021</span><span>12/31/2021</span></th></tr></table></div>
            <div class="row contain data-view"><table>
              <tr><th>Header</th></tr>
              <tr><th>Capital Expenditures</th><td>(30.0)</td><td>(35.0)</td></tr>
            </table></div>"#;
        let r = HtmlExtractor.financial_report(html, "Cash Flow").unwrap();
        assert_eq!(r.headers[1], ("2021".to_string(), "12/31/2021".to_string()));
        assert_eq!(r.rows.len(), 1);
        assert_eq!(r.rows[0].0, "Capital Expenditures");
        assert_eq!(r.rows[0].1, vec!["(30.0)".to_string(), "(35.0)".to_string()]);
    }

    #[test]
    fn test_valuation_and_analysts() {
        let html = r#"<div data-module-name="StocksValuationModule">
              <a class="definition-link">Valuation</a><a class="definition-link">P/E</a>
              <table><tr><td class="data-compare"><dl><dt>AAPL</dt><dd>30.0</dd><dt>Industry</dt><dd>20.0</dd></dl></td></tr></table>
            </div>"#;
        let v = HtmlExtractor.valuation_tab(html, "Valuation").unwrap();
        assert_eq!(v.rows.len(), 1);
        assert_eq!(v.rows[0].metric, "P/E");
        assert_eq!(v.rows[0].columns[1], ("Industry".to_string(), "20.0".to_string()));

        let html = r#"<table class="ui-table provider-table"><tbody>
              <tr><td><div class="logo ford"></div><div class="x"></div><div class="rating 4"></div>
              <p class="rating-since">Rating Since 10/28/2021</p></td></tr>
            </tbody></table>"#;
        let rows = HtmlExtractor.analysts(html).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].provider(), Some("ford"));
        assert_eq!(rows[0].class_token(2, 1), Some("4"));
        assert_eq!(rows[0].rating_since.as_deref(), Some("Rating Since 10/28/2021"));
    }
}
