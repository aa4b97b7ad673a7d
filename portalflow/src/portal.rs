//! The claims portal's UI catalog: entry URL and every locator the session and tasks use.
//!
//! Candidate order follows what has worked against the live site, most specific first.

use crate::locator::Locator;
use crate::selector::{xpath_literal, Selector};
use crate::FileFormat;

pub const DEFAULT_PORTAL_URL: &str = "https://edi.nhis.or.kr/homeapp/wep/m/retrieveMain.xx";

#[derive(Debug, Clone)]
pub struct PortalLayout {
    pub entry_url: String,

    // Session
    pub credential_login: Locator,
    pub credential_frame: Locator,
    pub credential_password: Locator,
    pub credential_confirm: Locator,
    pub authenticated_indicators: Locator,
    pub logout_control: Locator,

    // Claim download
    pub claim_inquiry_menu: Locator,
    pub claim_start_date: Locator,
    pub claim_end_date: Locator,
    pub search_button: Locator,

    // Claim upload
    pub claim_upload_menu: Locator,
    pub file_input: Locator,
    pub validate_button: Locator,
    pub validation_passed: Locator,
    pub validation_failed: Locator,
    pub submit_button: Locator,

    // Reports
    pub statistics_menu: Locator,
    pub report_start_date: Locator,
    pub report_end_date: Locator,
    pub generate_button: Locator,
}

impl PortalLayout {
    pub fn new(entry_url: impl Into<String>) -> Self {
        Self {
            entry_url: entry_url.into(),

            credential_login: Locator::of(
                "credential login trigger",
                [
                    "//a[contains(text(), '공동인증서')]",
                    "//button[contains(text(), '공동인증서')]",
                    "//*[contains(text(), '공동인증서') and contains(@class, 'btn')]",
                    "id:certLogin",
                    "class:cert-login",
                ],
            ),
            credential_frame: Locator::of("credential iframe", ["tag:iframe"]),
            credential_password: Locator::of(
                "credential password",
                ["id:certPassword", "id:password", "name:password", "//input[@type='password']"],
            ),
            credential_confirm: Locator::of(
                "credential confirm",
                [
                    "//button[contains(text(), '확인')]",
                    "//button[contains(text(), '로그인')]",
                    "id:confirmBtn",
                ],
            ),
            authenticated_indicators: Locator::of(
                "authenticated indicators",
                [
                    "//*[contains(text(), '로그아웃')]",
                    "//*[contains(text(), '마이페이지')]",
                    "id:logoutBtn",
                    "class:user-info",
                ],
            ),
            logout_control: Locator::of(
                "logout control",
                [
                    "//a[contains(text(), '로그아웃')]",
                    "//button[contains(text(), '로그아웃')]",
                    "id:logoutBtn",
                ],
            ),

            claim_inquiry_menu: Locator::of(
                "claim inquiry menu",
                [
                    "//a[contains(text(), '청구조회')]",
                    "//a[contains(text(), '진료비청구')]",
                    "link:청구관리",
                ],
            ),
            claim_start_date: Locator::of(
                "claim start date",
                ["id:startDate", "name:startDate", "//input[contains(@placeholder, '시작일')]"],
            ),
            claim_end_date: Locator::of(
                "claim end date",
                ["id:endDate", "name:endDate", "//input[contains(@placeholder, '종료일')]"],
            ),
            search_button: Locator::of(
                "search button",
                ["//button[contains(text(), '조회')]", "id:searchBtn", "class:btn-search"],
            ),

            claim_upload_menu: Locator::of(
                "claim upload menu",
                [
                    "//a[contains(text(), '청구접수')]",
                    "//a[contains(text(), '청구등록')]",
                    "link:접수등록",
                ],
            ),
            file_input: Locator::of(
                "file input",
                ["//input[@type='file']", "id:fileInput", "name:uploadFile"],
            ),
            validate_button: Locator::of(
                "validate button",
                ["//button[contains(text(), '검증')]", "id:validateBtn", "class:btn-validate"],
            ),
            validation_passed: Locator::of(
                "validation passed",
                [
                    "//*[contains(text(), '검증 성공')]",
                    "//*[contains(text(), '오류 없음')]",
                    "class:validation-success",
                ],
            ),
            validation_failed: Locator::of(
                "validation failed",
                [
                    "//*[contains(text(), '검증 실패')]",
                    "//*[contains(text(), '오류')]",
                    "class:validation-error",
                ],
            ),
            submit_button: Locator::of(
                "submit button",
                [
                    "//button[contains(text(), '제출')]",
                    "//button[contains(text(), '업로드')]",
                    "id:submitBtn",
                    "class:btn-submit",
                ],
            ),

            statistics_menu: Locator::of(
                "statistics menu",
                [
                    "//a[contains(text(), '통계')]",
                    "//a[contains(text(), '보고서')]",
                    "link:통계관리",
                ],
            ),
            report_start_date: Locator::of(
                "report start date",
                ["id:reportStartDate", "name:startDate", "//input[contains(@placeholder, '시작')]"],
            ),
            report_end_date: Locator::of(
                "report end date",
                ["id:reportEndDate", "name:endDate", "//input[contains(@placeholder, '종료')]"],
            ),
            generate_button: Locator::of(
                "generate button",
                [
                    "//button[contains(text(), '생성')]",
                    "//button[contains(text(), '조회')]",
                    "id:generateBtn",
                    "class:btn-generate",
                ],
            ),
        }
    }

    /// Download control on the claim search results for a file format.
    pub fn claim_download_button(&self, format: FileFormat) -> Locator {
        Locator::new(format!("claim download button ({format})"))
            .or(button_containing(format.as_str()))
            .or(button_containing(format.label()))
            .or(button_containing("다운로드"))
            .or("id:downloadBtn")
            .or("class:btn-download")
    }

    /// Download control on a generated report for a file format.
    pub fn report_download_button(&self, format: FileFormat) -> Locator {
        Locator::new(format!("report download button ({format})"))
            .or(button_containing(format.as_str()))
            .or(button_containing(format.label()))
            .or(button_containing("다운로드"))
            .or("id:downloadReportBtn")
    }

    /// Option, label or radio value naming a report kind.
    pub fn report_kind_option(&self, kind: &str) -> Locator {
        let literal = xpath_literal(kind);
        Locator::new(format!("report kind '{kind}'"))
            .or(Selector::XPath(format!("//option[contains(text(), {literal})]")))
            .or(Selector::XPath(format!("//label[contains(text(), {literal})]")))
            .or(Selector::XPath(format!("//input[@value={literal}]")))
    }
}

impl Default for PortalLayout {
    fn default() -> Self {
        Self::new(DEFAULT_PORTAL_URL)
    }
}

fn button_containing(text: &str) -> Selector {
    Selector::XPath(format!("//button[contains(text(), {})]", xpath_literal(text)))
}
