//! Declarative remote workflows
//!
//! Each remote action is a fixed table of checkpoints. A checkpoint renders a
//! request from the workflow variables, asserts the response marker, captures
//! values into the variables for later steps, and optionally pauses.
//!
//! Templates use `{name}` placeholders resolved against the variable map.

use super::pacing::Pacer;
use super::parser::{decode_html_entities, unescape_js};
use super::transport::{PageRequest, PageResponse, Transport};
use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashMap;

/// Workflow variables
pub type Vars = HashMap<&'static str, String>;

/// Expected marker on a checkpoint response
#[derive(Debug, Clone, Copy)]
pub enum Marker {
    /// Navigation step, nothing asserted
    Any,
    /// Final URL (after redirects) must contain the text
    UrlContains(&'static str),
    /// Response body must contain the text
    BodyContains(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub enum Source {
    Url,
    Body,
}

#[derive(Debug, Clone, Copy)]
pub enum Decode {
    Raw,
    /// `\xNN` escapes inside a JavaScript string literal
    JsEscapes,
    /// HTML entities inside element text
    Html,
}

/// Pull a value out of a response; the pattern must name a `value` group
#[derive(Debug, Clone, Copy)]
pub struct Capture {
    pub var: &'static str,
    pub source: Source,
    pub pattern: &'static str,
    pub decode: Decode,
}

#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    pub name: &'static str,
    pub url: &'static str,
    /// Non-empty form makes the request a POST
    pub form: &'static [(&'static str, &'static str)],
    pub expect: Marker,
    pub captures: &'static [Capture],
    pub pace: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Workflow {
    pub name: &'static str,
    pub steps: &'static [Checkpoint],
}

const CONTINUE: &str = "Continue \u{bb}";

const fn nav(name: &'static str, url: &'static str) -> Checkpoint {
    Checkpoint {
        name,
        url,
        form: &[],
        expect: Marker::Any,
        captures: &[],
        pace: true,
    }
}

const SUMMARY: Checkpoint = nav("summary", "{base}/select/CampaignSummary");

const ADGROUP_PAGE: Checkpoint = nav(
    "adgroup",
    "{base}/select/CampaignManagement?adgroupid={adgroup_id}&campaignId={campaign_id}",
);

const CREATIVE_FORM: &[(&str, &str)] = &[
    ("thisAction", "//CreateAd"),
    ("creativeScope", "textController.textCreative"),
    ("controllerScope", "textController"),
    ("textController.textCreative.headline", "{headline}"),
    ("textController.textCreative.description1", "{adline1}"),
    ("textController.textCreative.description2", "{adline2}"),
    ("textController.textCreative.visibleUrl", "{display_url}"),
    ("textController.protocol", "{protocol}"),
    ("textController.destUrl", "{destination}"),
    ("continueButton", CONTINUE),
];

const KEYWORDS_FORM: &[(&str, &str)] = &[
    ("thisAction", "//ChooseKeywords"),
    ("akssSuggestedKeywords", ""),
    ("cksSuggestedKeywords", ""),
    ("helperSuggestedKeywords", ""),
    ("keywords", "{keywords}"),
    ("continueButton", CONTINUE),
];

const CREATIVE_STEP: Checkpoint = Checkpoint {
    name: "creative",
    url: "{base}/select/StartCKSRequest?wizardKey={wizard_key}",
    form: CREATIVE_FORM,
    expect: Marker::UrlContains("ChooseKeywords"),
    captures: &[],
    pace: false,
};

const KEYWORDS_STEP: Checkpoint = Checkpoint {
    name: "keywords",
    url: "{base}/select/ChooseKeywordsInput?wizardKey={wizard_key}",
    form: KEYWORDS_FORM,
    expect: Marker::UrlContains("SetPricing"),
    captures: &[],
    pace: false,
};

const EDITOR_SAVE_FORM: &[(&str, &str)] = &[
    ("campaignId", "{campaign_id}"),
    ("adgroupid", "{adgroup_id}"),
    ("price", "{price}"),
    ("priceContent", "Auto"),
    ("keywords", "{keywords}"),
    ("save", "Save+Changes"),
];

const EDITOR_URL: &str = "{base}/select/EditKeywords?adgroupid={adgroup_id}&campaignId={campaign_id}#a";

const EDITOR_SAVE: Checkpoint = Checkpoint {
    name: "save",
    url: "{base}/select/EditKeywords",
    form: EDITOR_SAVE_FORM,
    expect: Marker::UrlContains("CampaignManagement"),
    captures: &[],
    pace: false,
};

const KEYWORDS_TEXTAREA: Capture = Capture {
    var: "keywords",
    source: Source::Body,
    pattern: r#"<textarea [^>]*name="keywords"[^>]*>(?P<value>[^<]*)</textarea>"#,
    decode: Decode::Html,
};

const PRICE_INPUT: Capture = Capture {
    var: "price",
    source: Source::Body,
    pattern: r#"<input [^>]*name="price"[^>]*value="(?P<value>[^"]+)""#,
    decode: Decode::Html,
};

pub const SIGN_IN: Workflow = Workflow {
    name: "sign_in",
    steps: &[
        nav("landing", "{base}/"),
        Checkpoint {
            name: "login",
            url: "{login_url}",
            form: &[
                ("continue", "{base}/select/gaiaauth?apt=None&ugl=true"),
                ("service", "adwords"),
                ("ifr", "false"),
                ("ltmpl", "adwords"),
                ("hl", "en-US"),
                ("alwf", "true"),
                ("Email", "{email}"),
                ("Passwd", "{password}"),
                ("PersistentCookie", "yes"),
                ("rmShown", "1"),
                ("signIn", "Sign in"),
            ],
            expect: Marker::BodyContains("location.replace("),
            captures: &[Capture {
                var: "session_url",
                source: Source::Body,
                pattern: r#"location\.replace\("(?P<value>[^"]*)"\)"#,
                decode: Decode::JsEscapes,
            }],
            pace: false,
        },
        nav("session", "{session_url}"),
    ],
};

pub const SIGN_OUT: Workflow = Workflow {
    name: "sign_out",
    steps: &[nav("logout", "{base}/select/gaialogout")],
};

pub const CREATE_CAMPAIGN: Workflow = Workflow {
    name: "create_campaign",
    steps: &[
        SUMMARY,
        Checkpoint {
            name: "start",
            url: "{base}/select/StartNewCampaign",
            form: &[],
            expect: Marker::UrlContains("TargetingWizardWithGeoPicker"),
            captures: &[Capture {
                var: "wizard_key",
                source: Source::Url,
                pattern: r"TargetingWizardWithGeoPicker.+wizardKey=(?P<value>\w+)",
                decode: Decode::Raw,
            }],
            pace: true,
        },
        Checkpoint {
            name: "targeting",
            url: "{base}/select/TargetingWizardWithGeoPickerInput?wizardKey={wizard_key}",
            form: &[
                ("campaignBox", "noneSelected"),
                ("campaignName", "{campaign_name}"),
                ("adGroupName", "{adgroup_name}"),
                ("language", "en"),
                ("targetedLocationsSerialized", "{target_location}"),
                ("excludedLocationsSerialized", ""),
                ("emptyAudienceMeansTargetsAllCountries", "false"),
                ("continueButton", CONTINUE),
            ],
            expect: Marker::UrlContains("FirstAdTypeFinder"),
            captures: &[],
            pace: false,
        },
        CREATIVE_STEP,
        KEYWORDS_STEP,
        Checkpoint {
            name: "pricing",
            url: "{base}/select/SetPricingInput?wizardKey={wizard_key}",
            form: &[
                ("thisAction", "//SetPricing"),
                ("initialCurrencyCode", "USD"),
                ("usersBudgetUnits", "{budget}"),
                ("usersBudgetPeriod", "DAILY"),
                ("usersMaxCpcUnits", "{bid}"),
                ("usersMaxContentCpcUnits", ""),
                ("continueButton", CONTINUE),
            ],
            expect: Marker::UrlContains("ReviewAccount"),
            captures: &[],
            pace: false,
        },
        Checkpoint {
            name: "save",
            url: "{base}/select/ReviewAccountInput?wizardKey={wizard_key}",
            form: &[("saveCampaignButton", "Save Campaign")],
            expect: Marker::UrlContains("CampaignManagement"),
            captures: &[
                Capture {
                    var: "campaign_id",
                    source: Source::Url,
                    pattern: r"CampaignManagement.+campaignid=(?P<value>\d+)",
                    decode: Decode::Raw,
                },
                Capture {
                    var: "adgroup_id",
                    source: Source::Body,
                    pattern: r"adgroupid=(?P<value>\d+)",
                    decode: Decode::Raw,
                },
            ],
            pace: false,
        },
        SUMMARY,
    ],
};

pub const CREATE_ADGROUP: Workflow = Workflow {
    name: "create_adgroup",
    steps: &[
        SUMMARY,
        nav(
            "campaign",
            "{base}/select/CampaignManagementDispatcher?campaignid={campaign_id}#a",
        ),
        Checkpoint {
            name: "start",
            url: "{base}/select/StartNewAdGroup?campaignId={campaign_id}",
            form: &[],
            expect: Marker::UrlContains("TargetingWizard"),
            captures: &[Capture {
                var: "wizard_key",
                source: Source::Url,
                pattern: r"TargetingWizard.+wizardKey=(?P<value>\w+)",
                decode: Decode::Raw,
            }],
            pace: true,
        },
        Checkpoint {
            name: "targeting",
            url: "{base}/select/TargetingWizardInput?wizardKey={wizard_key}",
            form: &[
                ("thisAction", "//TargetingWizard"),
                ("adGroupName", "{adgroup_name}"),
                ("continueButton", CONTINUE),
            ],
            expect: Marker::UrlContains("FirstAdTypeFinder"),
            captures: &[],
            pace: false,
        },
        CREATIVE_STEP,
        KEYWORDS_STEP,
        Checkpoint {
            name: "pricing",
            url: "{base}/select/SetPricingInput?wizardKey={wizard_key}",
            form: &[
                ("initialCurrencyCode", "USD"),
                ("usersMaxCpcUnits", "{bid}"),
                ("usersMaxContentCpcUnits", ""),
                ("continueButton", CONTINUE),
            ],
            expect: Marker::UrlContains("ReviewAccount"),
            captures: &[],
            pace: false,
        },
        Checkpoint {
            name: "save",
            url: "{base}/select/ReviewAccountInput?wizardKey={wizard_key}",
            form: &[("saveAdgroupButton", "Save Ad Group")],
            expect: Marker::UrlContains("CampaignManagement"),
            captures: &[Capture {
                var: "adgroup_id",
                source: Source::Url,
                pattern: r"CampaignManagement.+adgroupid=(?P<value>\d+)",
                decode: Decode::Raw,
            }],
            pace: false,
        },
        SUMMARY,
    ],
};

pub const DELETE_ADGROUP: Workflow = Workflow {
    name: "delete_adgroup",
    steps: &[
        ADGROUP_PAGE,
        Checkpoint {
            name: "delete",
            url: "{base}/select/ModifyAdGroup?url=CampaignManagement&adgroupid={adgroup_id}&campaignId={campaign_id}&mode=deleteadgroup",
            form: &[],
            expect: Marker::UrlContains("ModifyAdGroup"),
            captures: &[],
            pace: true,
        },
        SUMMARY,
    ],
};

pub const GET_KEYWORDS: Workflow = Workflow {
    name: "get_keywords",
    steps: &[
        ADGROUP_PAGE,
        Checkpoint {
            name: "editor",
            url: EDITOR_URL,
            form: &[],
            expect: Marker::Any,
            captures: &[KEYWORDS_TEXTAREA],
            pace: true,
        },
        SUMMARY,
    ],
};

/// Replaces the keyword list, resubmitting the current default bid unchanged
pub const SET_KEYWORDS: Workflow = Workflow {
    name: "set_keywords",
    steps: &[
        ADGROUP_PAGE,
        Checkpoint {
            name: "editor",
            url: EDITOR_URL,
            form: &[],
            expect: Marker::Any,
            captures: &[PRICE_INPUT],
            pace: true,
        },
        EDITOR_SAVE,
        SUMMARY,
    ],
};

/// Replaces the default bid, resubmitting the current keyword list unchanged
pub const SET_DEFAULT_BID: Workflow = Workflow {
    name: "set_default_bid",
    steps: &[
        ADGROUP_PAGE,
        Checkpoint {
            name: "editor",
            url: EDITOR_URL,
            form: &[],
            expect: Marker::Any,
            captures: &[KEYWORDS_TEXTAREA],
            pace: true,
        },
        EDITOR_SAVE,
        SUMMARY,
    ],
};

const KEYWORD_TAB_URL: &str = "{base}/select/CampaignManagement?adgroupid={adgroup_id}&campaignId={campaign_id}&keywordt=0&active_tab=keywordt&advariationst=4&mode=#{adgroup_id}";

/// Selects the reporting period and lands on the first keyword page
pub const OPEN_REPORT: Workflow = Workflow {
    name: "keyword_report",
    steps: &[
        ADGROUP_PAGE,
        nav("period", "{base}/select/CampaignManagement?{period_query}"),
        nav("first_page", KEYWORD_TAB_URL),
    ],
};

/// Resets the keyword list to page 1 and leaves the ad group
pub const CLOSE_REPORT: Workflow = Workflow {
    name: "keyword_report",
    steps: &[nav("reset_page", KEYWORD_TAB_URL), SUMMARY],
};

/// Executes workflow tables over a transport
pub struct WorkflowRunner<'a> {
    transport: &'a dyn Transport,
    pacer: &'a dyn Pacer,
}

impl<'a> WorkflowRunner<'a> {
    pub fn new(transport: &'a dyn Transport, pacer: &'a dyn Pacer) -> Self {
        Self { transport, pacer }
    }

    /// Run every checkpoint in order; the first mismatch aborts the workflow
    ///
    /// Returns the last response.
    pub async fn run(&self, workflow: &Workflow, vars: &mut Vars) -> Result<PageResponse> {
        let mut last = PageResponse::default();

        for step in workflow.steps {
            let request = build_request(workflow, step, vars)?;
            let response = self.transport.fetch(&request).await?;

            check_marker(workflow, step, &response)?;
            for capture in step.captures {
                let value = extract(workflow, step, capture, &response)?;
                vars.insert(capture.var, value);
            }

            tracing::trace!(workflow = workflow.name, checkpoint = step.name, "Checkpoint passed");

            if step.pace {
                self.pacer.pause().await;
            }
            last = response;
        }

        Ok(last)
    }
}

fn build_request(workflow: &Workflow, step: &Checkpoint, vars: &Vars) -> Result<PageRequest> {
    let url = render(workflow, step, step.url, vars)?;
    if step.form.is_empty() {
        return Ok(PageRequest::get(url));
    }

    let form = step
        .form
        .iter()
        .map(|(key, template)| Ok((key.to_string(), render(workflow, step, template, vars)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(PageRequest::post(url, form))
}

/// Substitute `{name}` placeholders
pub fn render(workflow: &Workflow, step: &Checkpoint, template: &str, vars: &Vars) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + close];
        let value = vars.get(name).ok_or_else(|| {
            Error::Internal(format!(
                "{}/{}: template variable '{}' not set",
                workflow.name, step.name, name
            ))
        })?;
        out.push_str(&rest[..open]);
        out.push_str(value);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

fn check_marker(workflow: &Workflow, step: &Checkpoint, response: &PageResponse) -> Result<()> {
    let (ok, what) = match step.expect {
        Marker::Any => return Ok(()),
        Marker::UrlContains(text) => (response.url.contains(text), text),
        Marker::BodyContains(text) => (response.body.contains(text), text),
    };

    if ok {
        return Ok(());
    }

    tracing::warn!(
        workflow = workflow.name,
        checkpoint = step.name,
        expected = what,
        final_url = %response.url,
        "Checkpoint marker missing"
    );
    Err(Error::unexpected(
        workflow.name,
        step.name,
        format!("expected '{}' in response, landed on {}", what, response.url),
    ))
}

fn extract(
    workflow: &Workflow,
    step: &Checkpoint,
    capture: &Capture,
    response: &PageResponse,
) -> Result<String> {
    let regex = Regex::new(capture.pattern)
        .map_err(|e| Error::Internal(format!("bad capture pattern {}: {}", capture.pattern, e)))?;

    let haystack = match capture.source {
        Source::Url => &response.url,
        Source::Body => &response.body,
    };

    let raw = regex
        .captures(haystack)
        .and_then(|c| c.name("value"))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            tracing::warn!(
                workflow = workflow.name,
                checkpoint = step.name,
                var = capture.var,
                "Capture failed"
            );
            Error::unexpected(
                workflow.name,
                step.name,
                format!("could not extract '{}'", capture.var),
            )
        })?;

    Ok(match capture.decode {
        Decode::Raw => raw.to_string(),
        Decode::JsEscapes => unescape_js(raw),
        Decode::Html => decode_html_entities(raw),
    })
}
