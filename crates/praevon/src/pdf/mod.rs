//! Lease contract rendering.

mod writer;

use crate::marketplace::{ContractDetails, UserProfile};

use writer::{Align, Font, PageComposer};

/// Pure function from contract data to a PDF byte buffer.
pub trait ContractRenderer: Send + Sync {
    fn render(&self, details: &ContractDetails) -> Vec<u8>;
}

/// Residential lease layout: header, parties, premises, financial terms, clauses,
/// signature lines and an identifying footer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeasePdfRenderer;

impl ContractRenderer for LeasePdfRenderer {
    fn render(&self, details: &ContractDetails) -> Vec<u8> {
        let contract = &details.contract;
        let mut page = PageComposer::new();

        page.paragraph(
            Font::Bold,
            20.0,
            Align::Center,
            "RESIDENTIAL LEASE AGREEMENT",
        );
        page.gap(18.0);
        page.paragraph(
            Font::Regular,
            10.0,
            Align::Right,
            &format!("Praevon contract number: {}", contract.id),
        );
        page.paragraph(
            Font::Regular,
            10.0,
            Align::Right,
            &format!("Issued on: {}", contract.created_at.format("%B %-d, %Y")),
        );
        page.gap(18.0);

        party_section(&mut page, "LANDLORD (OWNER)", &details.landlord);
        party_section(&mut page, "TENANT", &details.tenant);

        section_heading(&mut page, "LEASED PREMISES");
        page.field(11.0, "Property", &details.property.title);
        page.field(11.0, "Address", &details.property.address);
        page.field(11.0, "City", &details.property.city);
        page.gap(10.0);

        section_heading(&mut page, "PRINCIPAL TERMS");
        page.field(11.0, "Monthly rent", &format!("${} COP", group_thousands(contract.monthly_rent)));
        page.field(11.0, "Start date", &contract.start_date.format("%Y-%m-%d").to_string());
        page.field(11.0, "End date", &contract.end_date.format("%Y-%m-%d").to_string());
        page.gap(10.0);

        section_heading(&mut page, "CLAUSES AND TERMS");
        page.paragraph(Font::Regular, 10.0, Align::Left, &contract.terms);
        page.gap(40.0);

        page.columns(Font::Bold, 12.0, "_________________________", "_________________________");
        page.columns(Font::Bold, 12.0, "Landlord signature", "Tenant signature");

        page.finish(
            &format!("Lease contract {}", contract.id),
            &format!(
                "This document was generated by the Praevon platform. Contract ID: {}",
                contract.id
            ),
        )
    }
}

fn section_heading(page: &mut PageComposer, title: &str) {
    page.paragraph(Font::Bold, 14.0, Align::Left, title);
    page.rule();
    page.gap(4.0);
}

fn party_section(page: &mut PageComposer, title: &str, party: &UserProfile) {
    section_heading(page, title);
    page.field(11.0, "Full name", &party.username);
    page.field(11.0, "Email", &party.email);
    page.field(11.0, "Phone", party.phone.as_deref().unwrap_or("Not provided"));
    page.gap(10.0);
}

fn group_thousands(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    grouped
}
