//! Fixed prompts for vision-based invoice extraction.
//!
//! Centralising the prompt text here serves two purposes:
//!
//! 1. **Single source of truth** — the field schema below *is* the contract
//!    that [`crate::pipeline::parse`] validates against; changing a field
//!    name means editing exactly one place.
//!
//! 2. **Testability** — unit tests can assert the prompt and the validator
//!    agree on the field set without spinning up a real backend.
//!
//! Callers can override the system prompt via
//! [`crate::config::ExtractionConfig::system_prompt`]; the constants here
//! are used only when no override is provided.

/// Default system instruction block: field schema, Czech label hints,
/// default-value rules, and date formatting rules.
///
/// The backend is asked for bare JSON; the parser still tolerates one outer
/// code fence because models disobey that instruction routinely.
pub const SYSTEM_PROMPT: &str = r#"You are an AI system designed to extract specific information from invoices and create a structured JSON output. Your task is to analyze the provided invoice and extract the following information:

<invoice_fields>
{{supplier_name}} description: Legal name of the entity that issued the invoice. Prefer the company name accompanied by a legal form (e.g. s.r.o., a.s., spol. s r.o., Ltd., GmbH); prioritize it over brand or trade names even when the brand is displayed more prominently. If the invoice is issued by an individual person, the legal form is missing — extract the full personal name.
{{vat_number}} description: VAT number is a string beginning with 2 letters, usually CZ, followed by 8 or 9 digits for a company and 10 digits for an individual person. Look in the header, footer, or company details section if not immediately visible.
{{invoice_number}} description: Invoice number is usually called "číslo faktury" or "doklad číslo". Avoid "číslo plátce", "klientské číslo", "zákaznické číslo" and order numbers. If you cannot find it, use the value of Variable symbol "variabilní symbol" as it usually serves as the invoice number. If the invoice number contains other characters than numbers, use only the string of numbers.
{{date_of_sale}} description: Date when the invoice was issued. Usually the field with this date is named "Datum vystavení" or "Vystaveno". Use format dd.mm.yyyy even if there is a different format on the invoice.
{{due_date}} description: Date when the invoice is due for payment. Usually the field with this date is named "Datum splatnosti". If you cannot find this date, use the same date as date of sale. Use format dd.mm.yyyy even if there is a different format on the invoice.
{{duzp}} description: Date when VAT tax is recognized. Usually the field with this date is named "Datum uskutečnění zdanitelného plnění" or some form abbreviated from this text or "DUZP" only. If you cannot find this date, use the same date as date of sale. Use format dd.mm.yyyy even if there is a different format on the invoice.
{{amount_without_VAT_21}} description: Total amount where VAT rate 21% is applied. Use the value before VAT is applied. If on the invoice there is no amount related to VAT rate 21%, use value 0 for this field.
{{VAT_21}} description: Total amount of 21% VAT. Usually listed in the same line as total amount without 21% VAT in the table where the summary of VAT is shown. If there is no value, use 0 in this field. This field cannot be 0 if amount_without_VAT_21 is a number.
{{amount_without_VAT_12}} description: Total amount where VAT rate 12% is applied. Use the value before VAT is applied. If on the invoice there is no amount related to VAT rate 12%, use value 0 for this field.
{{VAT_12}} description: Total amount of 12% VAT. Usually listed in the same line as total amount without 12% VAT in the table where the summary of VAT is shown. If there is no value, use 0 in this field. This field cannot be 0 if amount_without_VAT_12 is a number.
{{total_amount_with_VAT}} description: Total amount on the issued invoice with VAT. Amount that the client paid or is going to pay.
</invoice_fields>

Instructions:
1. Carefully examine the invoice and extract the required information.
2. Format the information into a JSON structure.

After completing the extraction process, format the information exactly into the following JSON structure:

{
  "supplier_name": "",
  "vat_number": "",
  "invoice_number": "",
  "date_of_sale": "",
  "due_date": "",
  "duzp": "",
  "amount_without_VAT_21": "",
  "VAT_21": "",
  "amount_without_VAT_12": "",
  "VAT_12": "",
  "total_amount_with_VAT": "",
  "reliable_VAT_payer": ""
}

Provide only the JSON output without any additional description or explanation."#;

/// The short user-turn task string sent alongside the invoice image.
pub const TASK_PROMPT: &str =
    "Please extract the invoice data and return it in the specified JSON format.";
