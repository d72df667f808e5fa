use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::handlers;
use crate::services::reconciliation::UnbalancedReference;
use crate::services::risk::RiskAssessment;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TransferDesk API",
        description = r#"
Inter-outlet stock transfer and reconciliation engine.

Moves inventory (products and packaging materials) between outlets through
an approval/dispatch/receipt lifecycle, records every movement in an
append-only ledger, detects quantity variances at receipt, scores them for
fraud risk, and tracks their investigation to resolution.

Authentication is handled by the surrounding gateway; mutating requests
carry the acting user (id and role) and the engine enforces role and
outlet-access policy.
"#
    ),
    components(schemas(
        ErrorResponse,
        RiskAssessment,
        UnbalancedReference,
        handlers::ActorDto,
        handlers::transfers::TransferLineRequest,
        handlers::transfers::PackagingLineRequest,
        handlers::transfers::CreateTransferRequest,
        handlers::transfers::ApprovalLineRequest,
        handlers::transfers::ApproveTransferRequest,
        handlers::transfers::RejectTransferRequest,
        handlers::transfers::CompleteTransferRequest,
        handlers::transfers::ReceiptLineRequest,
        handlers::transfers::ReceiveTransferRequest,
        handlers::transfers::CancelTransferRequest,
        handlers::transfers::TransferSummary,
        handlers::transfers::LineItemSummary,
        handlers::transfers::PackagingLineSummary,
        handlers::transfers::TransferDetailResponse,
        handlers::variances::VarianceSummary,
        handlers::variances::ReceiptResponse,
        handlers::variances::VarianceWithRiskResponse,
        handlers::variances::InvestigateVarianceRequest,
        handlers::stock::OnHandResponse,
    ))
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/docs`, serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
